use schemars::{JsonSchema, Schema, generate::SchemaSettings, transform::RestrictFormats};

/// Generate JSON schema for a given type T.
pub fn root_schema_for<T: JsonSchema>() -> Schema {
    let settings = SchemaSettings::draft2020_12().with(|s| {
        s.inline_subschemas = true;
        s.meta_schema = None; // Remove the $schema field

        let mut formater = RestrictFormats::default();
        formater.infer_from_meta_schema = false; // Do not infer formats from meta schema
        s.transforms.push(Box::new(formater)); // Remove the $format field
    });
    let generator = settings.into_generator();
    generator.into_root_schema_for::<T>()
}

/// Generate JSON schema for a given type T. Returns as serde_json::Value.
pub fn gen_schema_for<T: JsonSchema>() -> serde_json::Value {
    root_schema_for::<T>().to_value()
}

/// Finds the first JSON object in a model reply.
///
/// Models often wrap the object in a ```json fence or surround it with prose,
/// so this returns the slice between the first `{` and the last `}`.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end < start {
        return None;
    }
    text.get(start..=end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, JsonSchema)]
    #[allow(dead_code)]
    struct PromptArgs {
        /// natural language request
        prompt: String,
    }

    #[test]
    fn test_gen_schema_for() {
        let schema = gen_schema_for::<PromptArgs>();
        let s = serde_json::to_string(&schema).unwrap();
        assert!(!s.contains("$schema"));
        assert!(s.contains(r#""required":["prompt"]"#));
        assert_eq!(schema["title"], "PromptArgs");
    }

    #[test]
    fn test_extract_json_object() {
        let reply = "Here you go:\n```json\n{\"amount\": \"1.5\", \"currency\": \"BTC\"}\n```";
        assert_eq!(
            extract_json_object(reply),
            Some("{\"amount\": \"1.5\", \"currency\": \"BTC\"}")
        );
        assert_eq!(extract_json_object("no json here"), None);
        assert_eq!(extract_json_object("} {"), None);
    }
}
