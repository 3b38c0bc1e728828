/*!
Partition specs: how a tuple of partition values is derived from a record.

A [PartitionSpec] names the derived columns, the schema fields they come
from and the [Transform] applied to each. Partition field ids live in
their own id space starting at [PARTITION_FIELD_ID_START] and are unique
across every spec the table has ever had.
*/
use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::model::values::Value;

/// Partition field ids are assigned from 1000 to avoid colliding with
/// schema field ids.
pub const PARTITION_FIELD_ID_START: i32 = 1000;

/// How a source column is turned into a partition value.
///
/// On the wire a transform is a lowercase tag; `bucket` and `truncate`
/// carry their parameter inside the tag (`bucket[16]`, `truncate[8]`).
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Transform {
    /// Keep the source value as-is.
    Identity,
    /// Hash the value into one of N buckets.
    Bucket(u32),
    /// Keep a bounded prefix of the value.
    Truncate(u32),
    /// Years since 1970 of a date or timestamp.
    Year,
    /// Months since 1970-01 of a date or timestamp.
    Month,
    /// Days since 1970-01-01 of a date or timestamp.
    Day,
    /// Hours since 1970-01-01T00:00 of a timestamp.
    Hour,
    /// Discard the value; the partition value is always null.
    Void,
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Transform::Identity => write!(f, "identity"),
            Transform::Bucket(n) => write!(f, "bucket[{n}]"),
            Transform::Truncate(width) => write!(f, "truncate[{width}]"),
            Transform::Year => write!(f, "year"),
            Transform::Month => write!(f, "month"),
            Transform::Day => write!(f, "day"),
            Transform::Hour => write!(f, "hour"),
            Transform::Void => write!(f, "void"),
        }
    }
}

impl FromStr for Transform {
    type Err = Error;

    fn from_str(tag: &str) -> Result<Self> {
        if let Some(n) = tag
            .strip_prefix("bucket[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let n = n.trim().parse().map_err(|_| {
                Error::MetadataParse(format!("bucket count in {tag:?} is not an integer"))
            })?;
            return Ok(Transform::Bucket(n));
        }
        if let Some(width) = tag
            .strip_prefix("truncate[")
            .and_then(|rest| rest.strip_suffix(']'))
        {
            let width = width.trim().parse().map_err(|_| {
                Error::MetadataParse(format!("truncate width in {tag:?} is not an integer"))
            })?;
            return Ok(Transform::Truncate(width));
        }
        match tag {
            "identity" => Ok(Transform::Identity),
            "year" => Ok(Transform::Year),
            "month" => Ok(Transform::Month),
            "day" => Ok(Transform::Day),
            "hour" => Ok(Transform::Hour),
            "void" => Ok(Transform::Void),
            other => Err(Error::MetadataParse(format!(
                "unknown transform {other:?}"
            ))),
        }
    }
}

// The wire form is the display form, so serde rides on Display/FromStr.
impl Serialize for Transform {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Transform {
    fn deserialize<D: Deserializer<'de>>(
        deserializer: D,
    ) -> std::result::Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        tag.parse().map_err(de::Error::custom)
    }
}

const MICROS_PER_HOUR: i64 = 3_600_000_000;
const MICROS_PER_DAY: i64 = 24 * MICROS_PER_HOUR;

impl Transform {
    /// Apply the transform to a source value.
    ///
    /// Returns `None` for null partition values (the `void` transform),
    /// `Error::Transform` when the transform is undefined for the value's
    /// type.
    pub fn apply(&self, value: &Value) -> Result<Option<Value>> {
        let fail = || Error::Transform(self.to_string(), value.to_string());
        match self {
            Transform::Void => Ok(None),
            Transform::Identity => Ok(Some(value.clone())),
            Transform::Year | Transform::Month | Transform::Day | Transform::Hour => {
                let epoch_days = match value {
                    Value::Date(days) => *days as i64,
                    Value::Timestamp(micros) | Value::Timestamptz(micros) => {
                        if *self == Transform::Hour {
                            return Ok(Some(Value::Int(
                                micros.div_euclid(MICROS_PER_HOUR) as i32
                            )));
                        }
                        micros.div_euclid(MICROS_PER_DAY)
                    }
                    _ => return Err(fail()),
                };
                match self {
                    Transform::Day => Ok(Some(Value::Date(epoch_days as i32))),
                    Transform::Year => {
                        let date = chrono::NaiveDate::from_num_days_from_ce_opt(
                            epoch_days as i32 + 719_163,
                        )
                        .ok_or_else(fail)?;
                        use chrono::Datelike;
                        Ok(Some(Value::Int(date.year() - 1970)))
                    }
                    Transform::Month => {
                        let date = chrono::NaiveDate::from_num_days_from_ce_opt(
                            epoch_days as i32 + 719_163,
                        )
                        .ok_or_else(fail)?;
                        use chrono::Datelike;
                        let months = (date.year() - 1970) * 12 + date.month0() as i32;
                        Ok(Some(Value::Int(months)))
                    }
                    Transform::Hour => Err(fail()),
                    _ => unreachable!(),
                }
            }
            Transform::Bucket(n) => {
                if *n == 0 {
                    return Err(Error::Validation(
                        "bucket[0] is not a valid transform".to_string(),
                    ));
                }
                let hash = bucket_hash(value).ok_or_else(fail)?;
                Ok(Some(Value::Int(((hash & i32::MAX as u32) % n) as i32)))
            }
            Transform::Truncate(width) => {
                if *width == 0 {
                    return Err(Error::Validation(
                        "truncate[0] is not a valid transform".to_string(),
                    ));
                }
                let width = *width as i64;
                match value {
                    Value::Int(i) => Ok(Some(Value::Int(
                        (*i as i64 - (*i as i64).rem_euclid(width)) as i32,
                    ))),
                    Value::Long(l) => Ok(Some(Value::Long(l - l.rem_euclid(width)))),
                    Value::String(s) => Ok(Some(Value::String(
                        crate::model::values::truncate_lower(s, width as usize),
                    ))),
                    Value::Binary(b) => Ok(Some(Value::Binary(
                        b[..b.len().min(width as usize)].to_vec(),
                    ))),
                    _ => Err(fail()),
                }
            }
        }
    }

    /// Whether values ordered by the transform result are also ordered by
    /// the source value.
    pub fn preserves_order(&self) -> bool {
        !matches!(self, Transform::Bucket(_) | Transform::Void)
    }
}

/// The Iceberg 32-bit bucket hash of a value, when the type is bucketable.
fn bucket_hash(value: &Value) -> Option<u32> {
    match value {
        Value::Int(i) => Some(murmur3_32(&(*i as i64).to_le_bytes())),
        Value::Long(l) => Some(murmur3_32(&l.to_le_bytes())),
        Value::Date(d) => Some(murmur3_32(&(*d as i64).to_le_bytes())),
        Value::Time(t) | Value::Timestamp(t) | Value::Timestamptz(t) => {
            Some(murmur3_32(&t.to_le_bytes()))
        }
        Value::String(s) => Some(murmur3_32(s.as_bytes())),
        Value::Binary(b) | Value::Fixed(b) => Some(murmur3_32(b)),
        Value::Uuid(u) => Some(murmur3_32(u.as_bytes())),
        Value::Decimal(d) => Some(murmur3_32(&d.to_signed_bytes_be())),
        // floats and booleans are not valid bucket sources
        _ => None,
    }
}

// Murmur3 x86 32-bit with seed 0, as required by the Iceberg spec.
fn murmur3_32(data: &[u8]) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;
    let mut h1 = 0u32;
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let mut k1 = u32::from_le_bytes(chunk.try_into().unwrap());
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
        h1 = h1.rotate_left(13);
        h1 = h1.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }
    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k1 = 0u32;
        for (i, byte) in tail.iter().enumerate() {
            k1 |= (*byte as u32) << (8 * i);
        }
        k1 = k1.wrapping_mul(C1);
        k1 = k1.rotate_left(15);
        k1 = k1.wrapping_mul(C2);
        h1 ^= k1;
    }
    h1 ^= data.len() as u32;
    h1 ^= h1 >> 16;
    h1 = h1.wrapping_mul(0x85eb_ca6b);
    h1 ^= h1 >> 13;
    h1 = h1.wrapping_mul(0xc2b2_ae35);
    h1 ^= h1 >> 16;
    h1
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// One derived column of a partition spec.
pub struct PartitionField {
    /// The schema field the partition value is computed from.
    pub source_id: i32,
    /// Id of this partition field, unique across all of the table's specs.
    pub field_id: i32,
    /// Name of the derived column.
    pub name: String,
    /// How the source value becomes the partition value.
    pub transform: Transform,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone)]
#[serde(rename_all = "kebab-case")]
/// An ordered list of partition fields under a spec id.
pub struct PartitionSpec {
    /// Identifier, unique among the table's specs.
    pub spec_id: i32,
    /// The derived columns, in partition-tuple order.
    pub fields: Vec<PartitionField>,
}

impl PartitionSpec {
    /// The unpartitioned spec.
    pub fn unpartitioned() -> Self {
        PartitionSpec {
            spec_id: 0,
            fields: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_field() {
        let data = r#"
            {
                "source-id": 4,
                "field-id": 1000,
                "name": "ts_day",
                "transform": "day"
            }
        "#;
        let partition_field: PartitionField = serde_json::from_str(data).unwrap();

        assert_eq!(4, partition_field.source_id);
        assert_eq!(1000, partition_field.field_id);
        assert_eq!("ts_day", partition_field.name);
        assert_eq!(Transform::Day, partition_field.transform);
    }

    #[test]
    fn test_transform_tags_roundtrip() {
        let transforms = vec![
            Transform::Identity,
            Transform::Bucket(10),
            Transform::Truncate(10),
            Transform::Year,
            Transform::Month,
            Transform::Day,
            Transform::Hour,
            Transform::Void,
        ];
        for transform in transforms {
            // through serde
            let json = serde_json::to_string(&transform).unwrap();
            assert_eq!(
                transform,
                serde_json::from_str::<Transform>(&json).unwrap()
            );
            // and through the string form itself
            assert_eq!(
                transform,
                transform.to_string().parse::<Transform>().unwrap()
            );
        }
    }

    #[test]
    fn test_malformed_transform_tags_rejected() {
        for bad in ["bucket", "bucket[x]", "bucket[4", "truncate[]", "hash[4]"] {
            assert!(bad.parse::<Transform>().is_err(), "{bad} should fail");
        }
    }

    #[test]
    fn test_bucket_hash_vectors() {
        // reference hash values from the Iceberg spec appendix
        assert_eq!(murmur3_32(&34i64.to_le_bytes()), 2017239379);
        assert_eq!(murmur3_32("iceberg".as_bytes()), 1210000089);
    }

    #[test]
    fn test_bucket_int_and_long_agree() {
        let from_int = Transform::Bucket(16).apply(&Value::Int(34)).unwrap();
        let from_long = Transform::Bucket(16).apply(&Value::Long(34)).unwrap();
        assert_eq!(from_int, from_long);
    }

    #[test]
    fn test_bucket_rejects_double() {
        assert!(Transform::Bucket(16).apply(&Value::Double(1.5)).is_err());
    }

    #[test]
    fn test_void_is_null() {
        assert_eq!(Transform::Void.apply(&Value::Int(5)).unwrap(), None);
    }

    #[test]
    fn test_year_of_epoch_day() {
        // 2000-01-01 is day 10957
        let year = Transform::Year.apply(&Value::Date(10957)).unwrap();
        assert_eq!(year, Some(Value::Int(30)));
    }

    #[test]
    fn test_month_of_epoch_day() {
        let month = Transform::Month.apply(&Value::Date(10957)).unwrap();
        assert_eq!(month, Some(Value::Int(360)));
    }

    #[test]
    fn test_day_of_timestamp_floors_negative() {
        // one microsecond before the epoch is day -1
        let day = Transform::Day.apply(&Value::Timestamp(-1)).unwrap();
        assert_eq!(day, Some(Value::Date(-1)));
    }

    #[test]
    fn test_hour_of_timestamp() {
        let micros = 3 * super::MICROS_PER_HOUR + 17;
        let hour = Transform::Hour.apply(&Value::Timestamp(micros)).unwrap();
        assert_eq!(hour, Some(Value::Int(3)));
    }

    #[test]
    fn test_truncate_int_floors() {
        let truncated = Transform::Truncate(10).apply(&Value::Int(-7)).unwrap();
        assert_eq!(truncated, Some(Value::Int(-10)));
    }

    #[test]
    fn test_truncate_string() {
        let truncated = Transform::Truncate(3)
            .apply(&Value::String("iceberg".to_string()))
            .unwrap();
        assert_eq!(truncated, Some(Value::String("ice".to_string())));
    }

    #[test]
    fn test_identity_on_date() {
        let value = Value::Date(18262);
        assert_eq!(
            Transform::Identity.apply(&value).unwrap(),
            Some(value.clone())
        );
    }
}
