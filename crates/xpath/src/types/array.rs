//! XDM arrays: an ordered list of values treated as one item. Unlike a
//! sequence, an array nests and does not flatten.

use crate::error::{Result, XPathError};
use crate::types::sequence::XdmValue;

#[derive(Debug, Clone, PartialEq)]
pub struct XdmArray<N> {
    members: Vec<XdmValue<N>>,
}

impl<N> Default for XdmArray<N> {
    fn default() -> Self {
        Self {
            members: Vec::new(),
        }
    }
}

impl<N: stilo_xdm::SourceNode> XdmArray<N> {
    pub fn new(members: Vec<XdmValue<N>>) -> Self {
        Self { members }
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    /// One-based access, per the `array:get` convention.
    pub fn get(&self, position: i64) -> Result<&XdmValue<N>> {
        if position >= 1 {
            if let Some(member) = self.members.get((position - 1) as usize) {
                return Ok(member);
            }
        }
        Err(XPathError::ArrayIndexOutOfBounds {
            index: position,
            size: self.size(),
        })
    }

    pub fn put(&self, position: i64, value: XdmValue<N>) -> Result<Self> {
        self.get(position)?;
        let mut members = self.members.clone();
        members[(position - 1) as usize] = value;
        Ok(Self { members })
    }

    pub fn members(&self) -> &[XdmValue<N>] {
        &self.members
    }

    pub fn into_members(self) -> Vec<XdmValue<N>> {
        self.members
    }

    pub fn string_value(&self) -> String {
        self.members
            .iter()
            .map(XdmValue::to_string_value)
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// All members concatenated into one sequence.
    pub fn flattened(&self) -> XdmValue<N> {
        let mut out = XdmValue::empty();
        for member in &self.members {
            out.extend(member.clone());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stilo_xdm::XmlNode;

    type Array = XdmArray<XmlNode>;

    #[test]
    fn get_is_one_based_and_bounds_checked() {
        let array = Array::new(vec![XdmValue::from_integer(10), XdmValue::from_integer(20)]);
        assert_eq!(array.get(1).unwrap().to_double(), 10.0);
        assert_eq!(array.get(2).unwrap().to_double(), 20.0);
        assert_eq!(array.get(0).unwrap_err().code(), "FOAY0001");
        assert_eq!(array.get(3).unwrap_err().code(), "FOAY0001");
    }

    #[test]
    fn arrays_nest_without_flattening() {
        let inner = Array::new(vec![XdmValue::from_integer(1)]);
        let outer = Array::new(vec![XdmValue::from_item(
            crate::types::XdmItem::Array(inner),
        )]);
        assert_eq!(outer.size(), 1);
        assert_eq!(outer.flattened().len(), 1);
    }
}
