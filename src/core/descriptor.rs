use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Length of a face descriptor produced by the recognition network.
pub const DESCRIPTOR_LEN: usize = 128;

#[derive(Debug, Error, PartialEq)]
pub enum DescriptorError {
    #[error("Descriptor has {actual} components, expected {expected}")]
    WrongLength { expected: usize, actual: usize },

    #[error("Descriptor component {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("Descriptor component {index} is not a number")]
    NonNumericComponent { index: usize },

    #[error("Descriptor object has a non-numeric key: {key}")]
    NonNumeric { key: String },

    #[error("Descriptor is neither an array nor an index-keyed object")]
    UnsupportedShape,
}

/// A descriptor as it arrives from storage or an import file.
///
/// Typed float arrays that went through a JSON round-trip come back as
/// index-keyed objects, so both shapes are accepted here and coerced by
/// [`Descriptor::try_from`]. Components are kept as raw JSON values and any
/// other shape lands in `Other`, so a bad descriptor only fails its own face.
/// `NaN` is written as `null` by most JSON encoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDescriptor {
    Array(Vec<Value>),
    Indexed(BTreeMap<String, Value>),
    Other(Value),
}

impl Default for RawDescriptor {
    fn default() -> Self {
        RawDescriptor::Array(Vec::new())
    }
}

fn component(index: usize, value: &Value) -> Result<f64, DescriptorError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or(DescriptorError::NonFinite { index }),
        Value::Null => Err(DescriptorError::NonFinite { index }),
        _ => Err(DescriptorError::NonNumericComponent { index }),
    }
}

impl RawDescriptor {
    fn components(&self) -> Result<Vec<f64>, DescriptorError> {
        match self {
            RawDescriptor::Array(values) => values
                .iter()
                .enumerate()
                .map(|(index, value)| component(index, value))
                .collect(),
            RawDescriptor::Indexed(map) => {
                let mut indexed = Vec::with_capacity(map.len());
                for (key, value) in map {
                    let index: usize = key
                        .parse()
                        .map_err(|_| DescriptorError::NonNumeric { key: key.clone() })?;
                    indexed.push((index, value));
                }
                indexed.sort_by_key(|(index, _)| *index);

                // Keys must be exactly 0..n with no gaps.
                for (position, (index, _)) in indexed.iter().enumerate() {
                    if *index != position {
                        return Err(DescriptorError::WrongLength {
                            expected: DESCRIPTOR_LEN,
                            actual: indexed.len().max(*index + 1),
                        });
                    }
                }
                indexed
                    .into_iter()
                    .map(|(index, value)| component(index, value))
                    .collect()
            }
            RawDescriptor::Other(_) => Err(DescriptorError::UnsupportedShape),
        }
    }
}

impl From<Vec<f32>> for RawDescriptor {
    fn from(values: Vec<f32>) -> Self {
        RawDescriptor::Array(values.into_iter().map(|v| Value::from(f64::from(v))).collect())
    }
}

impl From<Vec<f64>> for RawDescriptor {
    fn from(values: Vec<f64>) -> Self {
        RawDescriptor::Array(values.into_iter().map(Value::from).collect())
    }
}

/// Fixed-length working vector used for every distance computation.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDescriptor", into = "Vec<f64>")]
pub struct Descriptor(Box<[f64; DESCRIPTOR_LEN]>);

impl Descriptor {
    pub fn zeros() -> Self {
        Self(Box::new([0.0; DESCRIPTOR_LEN]))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0[..]
    }

    /// A zero centroid marks a cluster that has never seen a face.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|v| *v == 0.0)
    }

    /// Euclidean (L2) distance.
    pub fn distance(&self, other: &Descriptor) -> f64 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| {
                let d = a - b;
                d * d
            })
            .sum::<f64>()
            .sqrt()
    }

    /// Dimension-wise mean. Returns `None` for an empty input.
    pub fn mean<'a, I>(descriptors: I) -> Option<Descriptor>
    where
        I: IntoIterator<Item = &'a Descriptor>,
    {
        let mut sum = [0.0f64; DESCRIPTOR_LEN];
        let mut count = 0usize;
        for descriptor in descriptors {
            for (acc, v) in sum.iter_mut().zip(descriptor.0.iter()) {
                *acc += v;
            }
            count += 1;
        }
        if count == 0 {
            return None;
        }

        let mut out = [0.0f64; DESCRIPTOR_LEN];
        for (o, s) in out.iter_mut().zip(sum.iter()) {
            *o = s / count as f64;
        }
        Some(Descriptor(Box::new(out)))
    }
}

impl std::fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Descriptor([{:.4}, {:.4}, {:.4}, ..])",
            self.0[0], self.0[1], self.0[2]
        )
    }
}

impl TryFrom<&[f64]> for Descriptor {
    type Error = DescriptorError;

    fn try_from(values: &[f64]) -> Result<Self, Self::Error> {
        if values.len() != DESCRIPTOR_LEN {
            return Err(DescriptorError::WrongLength {
                expected: DESCRIPTOR_LEN,
                actual: values.len(),
            });
        }
        let mut out = [0.0f64; DESCRIPTOR_LEN];
        for (index, (o, v)) in out.iter_mut().zip(values.iter()).enumerate() {
            if !v.is_finite() {
                return Err(DescriptorError::NonFinite { index });
            }
            *o = *v;
        }
        Ok(Descriptor(Box::new(out)))
    }
}

impl TryFrom<&RawDescriptor> for Descriptor {
    type Error = DescriptorError;

    fn try_from(raw: &RawDescriptor) -> Result<Self, Self::Error> {
        let components = raw.components()?;
        Descriptor::try_from(components.as_slice())
    }
}

impl TryFrom<RawDescriptor> for Descriptor {
    type Error = DescriptorError;

    fn try_from(raw: RawDescriptor) -> Result<Self, Self::Error> {
        Descriptor::try_from(&raw)
    }
}

impl From<Descriptor> for Vec<f64> {
    fn from(descriptor: Descriptor) -> Self {
        descriptor.0.to_vec()
    }
}

impl From<Descriptor> for RawDescriptor {
    fn from(descriptor: Descriptor) -> Self {
        RawDescriptor::from(descriptor.0.to_vec())
    }
}

#[cfg(test)]
pub(crate) fn descriptor_at(x: f64) -> Descriptor {
    let mut values = vec![0.0f64; DESCRIPTOR_LEN];
    values[0] = x;
    Descriptor::try_from(values.as_slice()).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_euclidean() {
        let a = descriptor_at(0.1);
        let b = descriptor_at(0.5);
        assert!((a.distance(&b) - 0.4).abs() < 1e-6);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_mean_is_dimension_wise() {
        let mean = Descriptor::mean([&descriptor_at(0.2), &descriptor_at(0.6)]).unwrap();
        assert!((mean.as_slice()[0] - 0.4).abs() < 1e-6);
        assert_eq!(mean.as_slice()[1], 0.0);
        assert!(Descriptor::mean(std::iter::empty()).is_none());
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let raw = RawDescriptor::from(vec![0.1f64, 0.2, 0.3]);
        assert_eq!(
            Descriptor::try_from(raw),
            Err(DescriptorError::WrongLength {
                expected: DESCRIPTOR_LEN,
                actual: 3
            })
        );
    }

    #[test]
    fn test_non_finite_is_rejected() {
        let mut values = vec![0.0f64; DESCRIPTOR_LEN];
        values[5] = f64::NAN;
        let result = Descriptor::try_from(RawDescriptor::from(values));
        assert_eq!(result, Err(DescriptorError::NonFinite { index: 5 }));
    }

    #[test]
    fn test_indexed_object_is_coerced() {
        let mut object = serde_json::Map::new();
        for i in 0..DESCRIPTOR_LEN {
            let value = if i == 0 { 0.25 } else { 0.0 };
            object.insert(i.to_string(), serde_json::json!(value));
        }
        let json = serde_json::Value::Object(object);

        let descriptor: Descriptor = serde_json::from_value(json).unwrap();
        assert!((descriptor.as_slice()[0] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_indexed_object_with_gap_is_rejected() {
        let json = serde_json::json!({"0": 0.1, "2": 0.3});
        let raw: RawDescriptor = serde_json::from_value(json).unwrap();
        assert!(Descriptor::try_from(raw).is_err());
    }

    #[test]
    fn test_serializes_as_plain_array() {
        let json = serde_json::to_value(descriptor_at(0.5)).unwrap();
        let array = json.as_array().unwrap();
        assert_eq!(array.len(), DESCRIPTOR_LEN);
        assert_eq!(array[0].as_f64().unwrap(), 0.5);
    }

    #[test]
    fn test_null_and_string_components_fail_per_descriptor() {
        let mut values: Vec<serde_json::Value> = vec![serde_json::json!(0.0); DESCRIPTOR_LEN];
        values[3] = serde_json::Value::Null;
        let raw: RawDescriptor = serde_json::from_value(serde_json::Value::Array(values.clone())).unwrap();
        assert_eq!(Descriptor::try_from(&raw), Err(DescriptorError::NonFinite { index: 3 }));

        values[3] = serde_json::json!("0.5");
        let raw: RawDescriptor = serde_json::from_value(serde_json::Value::Array(values)).unwrap();
        assert_eq!(
            Descriptor::try_from(&raw),
            Err(DescriptorError::NonNumericComponent { index: 3 })
        );
    }

    #[test]
    fn test_unexpected_shape_still_deserializes() {
        let raw: RawDescriptor = serde_json::from_str(r#""not a vector""#).unwrap();
        assert_eq!(Descriptor::try_from(&raw), Err(DescriptorError::UnsupportedShape));

        let raw: RawDescriptor = serde_json::from_str("null").unwrap();
        assert!(Descriptor::try_from(&raw).is_err());
    }

    #[test]
    fn test_indexed_object_with_null_value_is_rejected() {
        let json = serde_json::json!({"0": 0.1, "1": null});
        let raw: RawDescriptor = serde_json::from_value(json).unwrap();
        assert_eq!(Descriptor::try_from(&raw), Err(DescriptorError::NonFinite { index: 1 }));
    }
}
