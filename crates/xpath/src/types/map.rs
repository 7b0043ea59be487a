//! XDM maps.
//!
//! Entry order is insertion order and observable through `map:keys` and
//! `map:for-each`, hence the `IndexMap`. Keys are atomic values compared by
//! the `same-key` rules: numerics compare numerically across the three
//! numeric kinds, NaN equals itself, calendar values compare on their
//! timezone-normalized instant.

use indexmap::IndexMap;
use rust_decimal::Decimal;

use crate::error::{Result, XPathError};
use crate::types::atomic::AtomicValue;
use crate::types::sequence::XdmValue;

/// Canonical hashable form of a map key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MapKey {
    Boolean(bool),
    /// Canonical decimal string for every numeric kind; `NaN` for NaN.
    Number(String),
    String(String),
    Calendar(String),
    Duration(String),
    QName(String),
    Binary(String),
}

impl MapKey {
    pub fn from_atomic(value: &AtomicValue) -> Result<MapKey> {
        use AtomicValue as V;
        Ok(match value {
            V::Boolean(b) => MapKey::Boolean(*b),
            V::Integer(i) => MapKey::Number(Decimal::from(*i).normalize().to_string()),
            V::Decimal(d) => MapKey::Number(d.normalize().to_string()),
            V::Double(d) => {
                if d.is_nan() {
                    MapKey::Number("NaN".to_string())
                } else if d.is_infinite() {
                    MapKey::Number(if *d > 0.0 { "INF" } else { "-INF" }.to_string())
                } else {
                    match Decimal::try_from(*d) {
                        Ok(dec) => MapKey::Number(dec.normalize().to_string()),
                        Err(_) => MapKey::Number(format!("{:E}", d)),
                    }
                }
            }
            V::String(s) | V::UntypedAtomic(s) | V::AnyUri(s) => MapKey::String(s.clone()),
            V::DateTime(_) | V::Date(_) | V::Time(_) => {
                MapKey::Calendar(format!("{}|{}", value.type_name(), value.to_string_value()))
            }
            V::GYear(_) | V::GYearMonth(_) | V::GMonth(_) | V::GMonthDay(_) | V::GDay(_) => {
                MapKey::Calendar(format!("{}|{}", value.type_name(), value.to_string_value()))
            }
            V::Duration(d) | V::YearMonthDuration(d) | V::DayTimeDuration(d) => {
                MapKey::Duration(format!("{}|{}", d.signed_months(), d.signed_seconds()))
            }
            V::QName { uri, local, .. } => MapKey::QName(format!(
                "{{{}}}{}",
                uri.as_deref().unwrap_or(""),
                local
            )),
            V::HexBinary(bytes) | V::Base64Binary(bytes) => {
                MapKey::Binary(crate::types::atomic::hex_encode(bytes))
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct XdmMap<N> {
    entries: IndexMap<MapKey, (AtomicValue, XdmValue<N>)>,
}

impl<N> Default for XdmMap<N> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<N: stilo_xdm::SourceNode> XdmMap<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn contains(&self, key: &AtomicValue) -> bool {
        MapKey::from_atomic(key)
            .map(|k| self.entries.contains_key(&k))
            .unwrap_or(false)
    }

    pub fn get(&self, key: &AtomicValue) -> Option<&XdmValue<N>> {
        let key = MapKey::from_atomic(key).ok()?;
        self.entries.get(&key).map(|(_, value)| value)
    }

    /// Inserts or replaces; a replaced key keeps its original position.
    pub fn put(&mut self, key: AtomicValue, value: XdmValue<N>) -> Result<()> {
        let hashed = MapKey::from_atomic(&key)?;
        self.entries.insert(hashed, (key, value));
        Ok(())
    }

    pub fn remove(&mut self, key: &AtomicValue) {
        if let Ok(hashed) = MapKey::from_atomic(key) {
            self.entries.shift_remove(&hashed);
        }
    }

    pub fn keys(&self) -> impl Iterator<Item = &AtomicValue> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&AtomicValue, &XdmValue<N>)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    /// Builds a map from key/value pairs, erroring on duplicates.
    pub fn from_entries_rejecting_duplicates(
        pairs: Vec<(AtomicValue, XdmValue<N>)>,
    ) -> Result<Self> {
        let mut map = Self::new();
        for (key, value) in pairs {
            if map.contains(&key) {
                return Err(XPathError::JsonDuplicateKey(key.to_string_value()));
            }
            map.put(key, value)?;
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Map = XdmMap<XmlNode>;

    #[test]
    fn numeric_keys_unify_across_kinds() {
        let mut map = Map::new();
        map.put(AtomicValue::Integer(1), XdmValue::from_string("one"))
            .unwrap();
        assert!(map.contains(&AtomicValue::Double(1.0)));
        assert!(map.contains(&AtomicValue::Decimal(Decimal::new(10, 1))));
        assert_eq!(map.size(), 1);
    }

    #[test]
    fn nan_is_a_usable_key() {
        let mut map = Map::new();
        map.put(AtomicValue::Double(f64::NAN), XdmValue::from_string("x"))
            .unwrap();
        assert!(map.contains(&AtomicValue::Double(f64::NAN)));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut map = Map::new();
        for key in ["c", "a", "b"] {
            map.put(
                AtomicValue::String(key.to_string()),
                XdmValue::from_string(key),
            )
            .unwrap();
        }
        let keys: Vec<String> = map.keys().map(|k| k.to_string_value()).collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
    }

    #[test]
    fn replacing_keeps_position() {
        let mut map = Map::new();
        map.put(AtomicValue::String("a".into()), XdmValue::from_integer(1))
            .unwrap();
        map.put(AtomicValue::String("b".into()), XdmValue::from_integer(2))
            .unwrap();
        map.put(AtomicValue::String("a".into()), XdmValue::from_integer(3))
            .unwrap();
        let keys: Vec<String> = map.keys().map(|k| k.to_string_value()).collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert_eq!(
            map.get(&AtomicValue::String("a".into())).unwrap().to_double(),
            3.0
        );
    }
}
