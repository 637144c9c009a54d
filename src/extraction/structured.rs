//! JSON → YAML and XML → ordered-mapping → YAML extraction.
//!
//! Both converge on a `serde_yaml::Value` tree so a single `to_string` call
//! produces the block-style dump the spec requires; `serde_yaml::Mapping`
//! preserves insertion order, which is what keeps JSON key order intact.

use crate::error::RagError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_yaml::{Mapping, Value as YamlValue};

pub fn json_to_yaml(text: &str) -> Result<String, RagError> {
    let json_value: serde_json::Value = serde_json::from_str(text)?;
    let yaml_value = json_to_yaml_value(&json_value);
    serde_yaml::to_string(&yaml_value)
        .map_err(|e| RagError::Internal(anyhow::anyhow!("yaml dump failed: {e}")))
}

fn json_to_yaml_value(v: &serde_json::Value) -> YamlValue {
    match v {
        serde_json::Value::Null => YamlValue::Null,
        serde_json::Value::Bool(b) => YamlValue::Bool(*b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                YamlValue::Number(i.into())
            } else if let Some(f) = n.as_f64() {
                YamlValue::Number(f.into())
            } else {
                YamlValue::Null
            }
        }
        serde_json::Value::String(s) => YamlValue::String(s.clone()),
        serde_json::Value::Array(arr) => {
            YamlValue::Sequence(arr.iter().map(json_to_yaml_value).collect())
        }
        serde_json::Value::Object(map) => {
            let mut out = Mapping::new();
            for (k, v) in map {
                out.insert(YamlValue::String(k.clone()), json_to_yaml_value(v));
            }
            YamlValue::Mapping(out)
        }
    }
}

/// Parse XML into an ordered mapping the way `xmltodict` does: attributes
/// become `@name` keys, text content becomes `#text`, repeated sibling tags
/// collapse into a sequence instead of overwriting each other.
pub fn xml_to_yaml(text: &str) -> Result<String, RagError> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let root = parse_xml_element(&mut reader, None, Mapping::new())?;
    serde_yaml::to_string(&root)
        .map_err(|e| RagError::Internal(anyhow::anyhow!("yaml dump failed: {e}")))
}

/// Parses events until the matching `End` for `open_tag` (or EOF for the
/// document root), returning the accumulated element as a YAML mapping.
/// `seed` carries the element's own attributes, collected by the caller
/// before recursing in here — they belong to this element's mapping, not
/// the parent's.
fn parse_xml_element(
    reader: &mut Reader<&[u8]>,
    open_tag: Option<&[u8]>,
    seed: Mapping,
) -> Result<YamlValue, RagError> {
    let mut mapping = seed;
    let mut text_accum = String::new();
    let mut buf = Vec::new();

    loop {
        match reader
            .read_event_into(&mut buf)
            .map_err(|e| RagError::Internal(anyhow::anyhow!("xml parse error: {e}")))?
        {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut attrs = Mapping::new();
                for attr in e.attributes().flatten() {
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    attrs.insert(YamlValue::String(key), YamlValue::String(value));
                }
                let child = parse_xml_element(reader, Some(e.name().as_ref()), attrs)?;
                insert_child(&mut mapping, &name, child);
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                let mut child_map = Mapping::new();
                for attr in e.attributes().flatten() {
                    let key = format!("@{}", String::from_utf8_lossy(attr.key.as_ref()));
                    let value = String::from_utf8_lossy(&attr.value).into_owned();
                    child_map.insert(YamlValue::String(key), YamlValue::String(value));
                }
                let child = if child_map.is_empty() {
                    YamlValue::Null
                } else {
                    YamlValue::Mapping(child_map)
                };
                insert_child(&mut mapping, &name, child);
            }
            Event::Text(t) => {
                text_accum.push_str(&t.unescape().unwrap_or_default());
            }
            Event::CData(t) => {
                text_accum.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(e) => {
                if let Some(open) = open_tag {
                    if e.name().as_ref() == open {
                        break;
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    let trimmed_text = text_accum.trim();
    if !trimmed_text.is_empty() {
        if mapping.is_empty() {
            return Ok(YamlValue::String(trimmed_text.to_string()));
        }
        mapping.insert(
            YamlValue::String("#text".to_string()),
            YamlValue::String(trimmed_text.to_string()),
        );
    }

    if mapping.is_empty() {
        Ok(YamlValue::Null)
    } else {
        Ok(YamlValue::Mapping(mapping))
    }
}

/// Insert a child under `name`, turning repeated siblings into a sequence
/// the way `xmltodict` aggregates same-named elements.
fn insert_child(mapping: &mut Mapping, name: &str, child: YamlValue) {
    let key = YamlValue::String(name.to_string());
    match mapping.get_mut(&key) {
        Some(YamlValue::Sequence(seq)) => seq.push(child),
        Some(existing) => {
            let prior = existing.clone();
            *existing = YamlValue::Sequence(vec![prior, child]);
        }
        None => {
            mapping.insert(key, child);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_object_preserves_key_order() {
        let yaml = json_to_yaml(r#"{"zeta": 1, "alpha": 2}"#).unwrap();
        let zeta_pos = yaml.find("zeta").unwrap();
        let alpha_pos = yaml.find("alpha").unwrap();
        assert!(zeta_pos < alpha_pos);
    }

    #[test]
    fn xml_attributes_become_at_keys() {
        let yaml = xml_to_yaml(r#"<root id="7">hello</root>"#).unwrap();
        assert!(yaml.contains("'@id'") || yaml.contains("@id"));
        assert!(yaml.contains("#text"));
        assert!(yaml.contains("hello"));
    }

    #[test]
    fn xml_repeated_siblings_become_sequence() {
        let yaml =
            xml_to_yaml(r#"<root><item>a</item><item>b</item></root>"#).unwrap();
        assert!(yaml.contains('-'));
    }
}
