// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::schema::ColumnType;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::io::{Read, Write};

const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_DATE: u8 = 2;
const TAG_STR: u8 = 3;

/// A single typed cell of a row.
///
/// Also serves as index key and index payload. Floats are ordered with
/// [`f32::total_cmp`], so `Value` forms a total order and can live in
/// sorted index structures.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 32-bit signed integer
    Int(i32),

    /// 32-bit float
    Float(f32),

    /// Textual date, at most 10 bytes on disk (`YYYY-MM-DD`)
    Date(String),

    /// Variable-length string, space-padded on disk
    Str(String),
}

impl Value {
    /// Returns the string content for `Date`/`Str`, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Date(s) | Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Parses a SQL literal that was not quoted.
    ///
    /// Integers become [`Value::Int`], other numbers [`Value::Float`],
    /// everything else [`Value::Str`].
    #[must_use]
    pub fn parse_literal(s: &str) -> Self {
        if let Ok(i) = s.parse::<i32>() {
            return Self::Int(i);
        }
        if let Ok(f) = s.parse::<f32>() {
            return Self::Float(f);
        }
        Self::Str(s.to_owned())
    }

    /// Coerces the value into the given column type.
    ///
    /// Numeric strings parse into numbers, integers widen to floats and
    /// anything stringifies into a VARCHAR. Impossible coercions return
    /// [`Error::InvalidValue`].
    pub fn coerce(&self, ty: &ColumnType) -> Result<Self> {
        match ty {
            ColumnType::Int => match self {
                Self::Int(i) => Ok(Self::Int(*i)),
                #[allow(clippy::cast_possible_truncation)]
                Self::Float(f) if f.fract() == 0.0 => Ok(Self::Int(*f as i32)),
                Self::Date(s) | Self::Str(s) => s
                    .trim()
                    .parse::<i32>()
                    .map(Self::Int)
                    .map_err(|_| Error::InvalidValue(format!("not an INT: {s:?}"))),
                Self::Float(f) => Err(Error::InvalidValue(format!("not an INT: {f}"))),
            },
            ColumnType::Float => match self {
                Self::Float(f) => Ok(Self::Float(*f)),
                #[allow(clippy::cast_precision_loss)]
                Self::Int(i) => Ok(Self::Float(*i as f32)),
                Self::Date(s) | Self::Str(s) => parse_float(s)
                    .map(Self::Float)
                    .ok_or_else(|| Error::InvalidValue(format!("not a FLOAT: {s:?}"))),
            },
            ColumnType::Date => match self {
                Self::Date(s) | Self::Str(s) => Ok(Self::Date(s.clone())),
                other => Err(Error::InvalidValue(format!("not a DATE: {other}"))),
            },
            ColumnType::Varchar(_) => Ok(Self::Str(self.to_string())),
        }
    }
}

/// Parses a float out of a messy textual cell.
///
/// Strips currency signs and thousands separators, then takes the first
/// whitespace-separated token (`"$1,265.00 - $1,299.00"` -> `1265.0`).
#[must_use]
pub fn parse_float(s: &str) -> Option<f32> {
    let cleaned = s.replace(['$', ','], "");
    let token = cleaned.split_whitespace().next()?;
    token.parse::<f32>().ok()
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Int(_) | Value::Float(_) => 0,
        Value::Date(_) | Value::Str(_) => 1,
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

// Numbers compare numerically (ints widen to floats), strings and dates
// compare lexicographically, numbers sort before strings. Cross-kind
// comparisons only happen before query literals are coerced to the
// column type.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Int(a), Self::Float(b)) => (*a as f32).total_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Int(b)) => a.total_cmp(&(*b as f32)),
            (Self::Date(a) | Self::Str(a), Self::Date(b) | Self::Str(b)) => a.cmp(b),
            (a, b) => rank(a).cmp(&rank(b)),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Date(s) | Self::Str(s) => write!(f, "{s}"),
        }
    }
}

impl Encode for Value {
    fn encode_into<W: Write>(&self, writer: &mut W) -> std::result::Result<(), EncodeError> {
        match self {
            Self::Int(i) => {
                writer.write_u8(TAG_INT)?;
                writer.write_i32::<LittleEndian>(*i)?;
            }
            Self::Float(x) => {
                writer.write_u8(TAG_FLOAT)?;
                writer.write_f32::<LittleEndian>(*x)?;
            }
            Self::Date(s) => {
                writer.write_u8(TAG_DATE)?;
                write_str(writer, s)?;
            }
            Self::Str(s) => {
                writer.write_u8(TAG_STR)?;
                write_str(writer, s)?;
            }
        }
        Ok(())
    }
}

impl Decode for Value {
    fn decode_from<R: Read>(reader: &mut R) -> std::result::Result<Self, DecodeError> {
        let tag = reader.read_u8()?;
        match tag {
            TAG_INT => Ok(Self::Int(reader.read_i32::<LittleEndian>()?)),
            TAG_FLOAT => Ok(Self::Float(reader.read_f32::<LittleEndian>()?)),
            TAG_DATE => Ok(Self::Date(read_str(reader)?)),
            TAG_STR => Ok(Self::Str(read_str(reader)?)),
            _ => Err(DecodeError::InvalidTag(("Value", tag))),
        }
    }
}

fn write_str<W: Write>(writer: &mut W, s: &str) -> std::result::Result<(), EncodeError> {
    // NOTE: values are bounded by the fixed record layout, so u32 is plenty
    #[allow(clippy::cast_possible_truncation)]
    writer.write_u32::<LittleEndian>(s.len() as u32)?;
    writer.write_all(s.as_bytes())?;
    Ok(())
}

fn read_str<R: Read>(reader: &mut R) -> std::result::Result<String, DecodeError> {
    let len = reader.read_u32::<LittleEndian>()? as usize;
    let mut buf = vec![0; len];
    reader.read_exact(&mut buf)?;
    Ok(String::from_utf8(buf)?)
}
