use serde_json::Value;

// Keys some upstreams reject inside tool parameter / structured output
// schemas. `type`, `properties`, `required`, `enum`, `items` and `$ref` are
// always preserved.
const REJECTED_BOUNDS: &[&str] = &[
	"minimum",
	"maximum",
	"exclusiveMinimum",
	"exclusiveMaximum",
	"minLength",
	"maxLength",
	"minItems",
	"maxItems",
];

/// Recursively strips schema keys that picky upstreams refuse. The top level
/// additionally loses `description` and `strict`.
pub fn sanitize_schema(schema: &mut Value) {
	sanitize_level(schema, true);
}

/// Same as [`sanitize_schema`], then pins `additionalProperties: false` at the
/// top level, which strict Azure deployments require.
pub fn sanitize_schema_for_azure(schema: &mut Value) {
	sanitize_level(schema, true);
	if let Some(obj) = schema.as_object_mut() {
		obj.insert("additionalProperties".to_string(), Value::Bool(false));
	}
}

fn sanitize_level(value: &mut Value, top: bool) {
	match value {
		Value::Object(obj) => {
			obj.remove("$schema");
			obj.remove("additionalProperties");
			for key in REJECTED_BOUNDS {
				obj.remove(*key);
			}
			if top {
				obj.remove("description");
				obj.remove("strict");
			}
			for (_, v) in obj.iter_mut() {
				sanitize_level(v, false);
			}
		},
		Value::Array(items) => {
			for v in items.iter_mut() {
				sanitize_level(v, false);
			}
		},
		_ => {},
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	#[test]
	fn strips_rejected_keys_recursively() {
		let mut schema = json!({
			"$schema": "http://json-schema.org/draft-07/schema#",
			"type": "object",
			"description": "top level goes away",
			"additionalProperties": false,
			"properties": {
				"age": {
					"type": "integer",
					"minimum": 0,
					"maximum": 150,
					"description": "nested descriptions stay"
				},
				"tags": {
					"type": "array",
					"minItems": 1,
					"items": {"type": "string", "maxLength": 32}
				}
			},
			"required": ["age"]
		});
		sanitize_schema(&mut schema);
		assert_eq!(
			schema,
			json!({
				"type": "object",
				"properties": {
					"age": {"type": "integer", "description": "nested descriptions stay"},
					"tags": {"type": "array", "items": {"type": "string"}}
				},
				"required": ["age"]
			})
		);
	}

	#[test]
	fn azure_variant_reinserts_additional_properties() {
		let mut schema = json!({
			"type": "object",
			"additionalProperties": {"type": "string"},
			"properties": {"a": {"type": "string", "additionalProperties": false}}
		});
		sanitize_schema_for_azure(&mut schema);
		assert_eq!(schema.get("additionalProperties").unwrap(), &json!(false));
		assert_eq!(
			schema.pointer("/properties/a").unwrap(),
			&json!({"type": "string"})
		);
	}

	#[test]
	fn ref_and_enum_are_preserved() {
		let mut schema = json!({
			"type": "object",
			"properties": {
				"unit": {"enum": ["c", "f"]},
				"loc": {"$ref": "#/definitions/loc"}
			}
		});
		let before = schema.clone();
		sanitize_schema(&mut schema);
		assert_eq!(schema, before);
	}
}
