//! Typed effect parameters.
//!
//! Hosts describe an effect as a name plus a bag of named values; the
//! registry in [`effects`](crate::effects) checks the bag against the
//! effect's recognized parameter set and fills in defaults at chain-build
//! time. Nothing here touches the GPU.

use std::collections::BTreeMap;

use glam::Vec2;

use crate::color::Color;

/// One effect parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamValue {
    Float(f32),
    Int(i32),
    Color(Color),
    Vec2(Vec2),
}

impl From<f32> for ParamValue {
    fn from(v: f32) -> Self {
        ParamValue::Float(v)
    }
}

impl From<i32> for ParamValue {
    fn from(v: i32) -> Self {
        ParamValue::Int(v)
    }
}

impl From<Color> for ParamValue {
    fn from(v: Color) -> Self {
        ParamValue::Color(v)
    }
}

impl From<Vec2> for ParamValue {
    fn from(v: Vec2) -> Self {
        ParamValue::Vec2(v)
    }
}

impl From<(f32, f32)> for ParamValue {
    fn from(v: (f32, f32)) -> Self {
        ParamValue::Vec2(Vec2::new(v.0, v.1))
    }
}

impl ParamValue {
    /// Numeric coercion: ints are accepted where floats are expected.
    pub(crate) fn as_float(&self) -> Option<f32> {
        match self {
            ParamValue::Float(v) => Some(*v),
            ParamValue::Int(v) => Some(*v as f32),
            _ => None,
        }
    }

    pub(crate) fn as_int(&self) -> Option<i32> {
        match self {
            ParamValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub(crate) fn as_vec2(&self) -> Option<Vec2> {
        match self {
            ParamValue::Vec2(v) => Some(*v),
            _ => None,
        }
    }
}

/// A named bag of effect parameters.
///
/// Built fluently; unspecified parameters take the effect's defaults:
///
/// ```ignore
/// let node = ChainNode::all_layers()
///     .wrap_effect("bloom", EffectParams::new().with("radius", 24.0))?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectParams {
    values: BTreeMap<String, ParamValue>,
}

impl EffectParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a parameter, consuming and returning the bag (builder style).
    pub fn with(mut self, name: &str, value: impl Into<ParamValue>) -> Self {
        self.values.insert(name.to_string(), value.into());
        self
    }

    /// Set a parameter in place.
    pub fn set(&mut self, name: &str, value: impl Into<ParamValue>) {
        self.values.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.values.get(name)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_and_reads_back() {
        let params = EffectParams::new()
            .with("radius", 4.0)
            .with("levels", 3)
            .with("offset", (2.0, -1.0));

        assert_eq!(params.get("radius"), Some(&ParamValue::Float(4.0)));
        assert_eq!(params.get("levels"), Some(&ParamValue::Int(3)));
        assert_eq!(
            params.get("offset"),
            Some(&ParamValue::Vec2(Vec2::new(2.0, -1.0)))
        );
        assert!(params.get("missing").is_none());
    }

    #[test]
    fn int_coerces_to_float_but_not_back() {
        assert_eq!(ParamValue::Int(5).as_float(), Some(5.0));
        assert_eq!(ParamValue::Float(5.0).as_int(), None);
    }
}
