//! AMF0 value model

use std::collections::HashMap;

/// A decoded AMF0 value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum AmfValue {
    /// 0x05
    #[default]
    Null,
    /// 0x06 (also produced for the "unsupported" marker)
    Undefined,
    /// 0x01
    Boolean(bool),
    /// 0x00, IEEE 754 double
    Number(f64),
    /// 0x02 or 0x0C (long string)
    String(String),
    /// 0x0A strict array
    Array(Vec<AmfValue>),
    /// 0x03 anonymous object
    Object(HashMap<String, AmfValue>),
    /// 0x08 associative array, as sent in onMetaData
    EcmaArray(HashMap<String, AmfValue>),
    /// 0x10 object with a class name
    TypedObject {
        class_name: String,
        properties: HashMap<String, AmfValue>,
    },
    /// 0x0B, milliseconds since the Unix epoch
    Date(f64),
    /// 0x0F
    Xml(String),
}

impl AmfValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AmfValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            AmfValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AmfValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Property map of any object-like value
    pub fn as_object(&self) -> Option<&HashMap<String, AmfValue>> {
        match self {
            AmfValue::Object(m) | AmfValue::EcmaArray(m) => Some(m),
            AmfValue::TypedObject { properties, .. } => Some(properties),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[AmfValue]> {
        match self {
            AmfValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn is_null_or_undefined(&self) -> bool {
        matches!(self, AmfValue::Null | AmfValue::Undefined)
    }

    pub fn get(&self, key: &str) -> Option<&AmfValue> {
        self.as_object()?.get(key)
    }

    pub fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key)?.as_str()
    }

    pub fn get_number(&self, key: &str) -> Option<f64> {
        self.get(key)?.as_number()
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key)?.as_bool()
    }

    /// JavaScript-style truthiness, used for metadata flags such as `stereo`
    pub fn is_truthy(&self) -> bool {
        match self {
            AmfValue::Null | AmfValue::Undefined => false,
            AmfValue::Boolean(b) => *b,
            AmfValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AmfValue::String(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Build an anonymous object from key/value pairs
    pub fn object<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<AmfValue>,
        I: IntoIterator<Item = (K, V)>,
    {
        AmfValue::Object(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl From<bool> for AmfValue {
    fn from(v: bool) -> Self {
        AmfValue::Boolean(v)
    }
}

impl From<f64> for AmfValue {
    fn from(v: f64) -> Self {
        AmfValue::Number(v)
    }
}

impl From<u32> for AmfValue {
    fn from(v: u32) -> Self {
        AmfValue::Number(f64::from(v))
    }
}

impl From<String> for AmfValue {
    fn from(v: String) -> Self {
        AmfValue::String(v)
    }
}

impl From<&str> for AmfValue {
    fn from(v: &str) -> Self {
        AmfValue::String(v.to_string())
    }
}

impl<V: Into<AmfValue>> From<Option<V>> for AmfValue {
    fn from(v: Option<V>) -> Self {
        v.map_or(AmfValue::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_builder_and_accessors() {
        let obj = AmfValue::object([
            ("app", AmfValue::from("live")),
            ("objectEncoding", AmfValue::from(0.0)),
            ("fpad", AmfValue::from(false)),
        ]);

        assert_eq!(obj.get_string("app"), Some("live"));
        assert_eq!(obj.get_number("objectEncoding"), Some(0.0));
        assert_eq!(obj.get_bool("fpad"), Some(false));
        assert_eq!(obj.get_string("missing"), None);
        assert!(AmfValue::Null.get("app").is_none());
    }

    #[test]
    fn test_object_like_variants() {
        let mut props = HashMap::new();
        props.insert("width".to_string(), AmfValue::Number(1280.0));

        let ecma = AmfValue::EcmaArray(props.clone());
        let typed = AmfValue::TypedObject {
            class_name: "Meta".into(),
            properties: props,
        };
        assert_eq!(ecma.get_number("width"), Some(1280.0));
        assert_eq!(typed.get_number("width"), Some(1280.0));
        assert!(AmfValue::Array(vec![]).as_object().is_none());
    }

    #[test]
    fn test_truthiness() {
        assert!(AmfValue::Boolean(true).is_truthy());
        assert!(AmfValue::Number(2.0).is_truthy());
        assert!(!AmfValue::Number(0.0).is_truthy());
        assert!(!AmfValue::String(String::new()).is_truthy());
        assert!(!AmfValue::Undefined.is_truthy());
        assert!(AmfValue::Object(HashMap::new()).is_truthy());
    }

    #[test]
    fn test_option_conversion() {
        assert_eq!(AmfValue::from(None::<f64>), AmfValue::Null);
        assert_eq!(AmfValue::from(Some(3u32)), AmfValue::Number(3.0));
        assert_eq!(AmfValue::default(), AmfValue::Null);
    }
}
