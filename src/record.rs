// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::schema::{ColumnType, Schema};
use crate::value::Value;
use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// A decoded row: one [`Value`] per schema column plus the tombstone flag.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    /// Cell values, in schema column order
    pub values: Vec<Value>,

    /// Logical deletion flag, persisted as the trailing record byte
    pub deleted: bool,
}

impl Row {
    /// Creates a live row from values.
    #[must_use]
    pub fn new(values: Vec<Value>) -> Self {
        Self {
            values,
            deleted: false,
        }
    }

    /// The value of the schema's primary key column.
    pub fn primary_key(&self, schema: &Schema) -> Result<&Value> {
        self.values
            .get(schema.primary_key_index())
            .ok_or(Error::InvalidRecord(self.values.len(), schema.columns().len()))
    }

    /// The value of a named column.
    pub fn get<'a>(&'a self, schema: &Schema, column: &str) -> Result<&'a Value> {
        let idx = schema.column_index(column)?;
        self.values
            .get(idx)
            .ok_or(Error::InvalidRecord(self.values.len(), schema.columns().len()))
    }

    /// Packs the row into its fixed-width byte image.
    ///
    /// VARCHAR values are truncated at byte level and space-padded, DATE
    /// keeps its first 10 bytes, numerics are little-endian. The last byte
    /// is the tombstone.
    pub fn encode(&self, schema: &Schema) -> Result<Vec<u8>> {
        if self.values.len() != schema.columns().len() {
            return Err(Error::InvalidValue(format!(
                "row has {} values, schema has {} columns",
                self.values.len(),
                schema.columns().len(),
            )));
        }

        let mut buf = Vec::with_capacity(schema.record_size());

        for (column, value) in schema.columns().iter().zip(&self.values) {
            let value = value.coerce(&column.ty)?;

            match (&column.ty, &value) {
                (ColumnType::Int, Value::Int(i)) => buf.write_i32::<LittleEndian>(*i)?,
                (ColumnType::Float, Value::Float(f)) => buf.write_f32::<LittleEndian>(*f)?,
                (ColumnType::Date, Value::Date(s)) => {
                    write_padded(&mut buf, s, column.ty.width());
                }
                (ColumnType::Varchar(n), Value::Str(s)) => write_padded(&mut buf, s, *n),
                _ => {
                    return Err(Error::InvalidValue(format!(
                        "value {value} does not fit column {}",
                        column.name,
                    )))
                }
            }
        }

        buf.push(u8::from(self.deleted));

        Ok(buf)
    }

    /// Unpacks a fixed-width byte image; the exact inverse of [`Row::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRecord`] if the buffer length does not match
    /// the schema's record size.
    pub fn decode(schema: &Schema, buf: &[u8]) -> Result<Self> {
        if buf.len() != schema.record_size() {
            return Err(Error::InvalidRecord(buf.len(), schema.record_size()));
        }

        let mut reader = buf;
        let mut values = Vec::with_capacity(schema.columns().len());

        for column in schema.columns() {
            let value = match &column.ty {
                ColumnType::Int => Value::Int(reader.read_i32::<LittleEndian>()?),
                ColumnType::Float => Value::Float(reader.read_f32::<LittleEndian>()?),
                ColumnType::Date => Value::Date(read_padded(&mut reader, DATE_LEN)?),
                ColumnType::Varchar(n) => Value::Str(read_padded(&mut reader, *n)?),
            };
            values.push(value);
        }

        let deleted = reader.read_u8()? != 0;

        Ok(Self { values, deleted })
    }
}

const DATE_LEN: usize = crate::schema::DATE_WIDTH;

fn write_padded(buf: &mut Vec<u8>, s: &str, width: usize) {
    let bytes = s.as_bytes();
    let take = bytes.len().min(width);
    buf.extend_from_slice(bytes.get(..take).unwrap_or_default());
    buf.resize(buf.len() + (width - take), b' ');
}

fn read_padded(reader: &mut &[u8], width: usize) -> Result<String> {
    let mut bytes = vec![0; width];
    std::io::Read::read_exact(reader, &mut bytes)?;
    let s = String::from_utf8_lossy(&bytes);
    Ok(s.trim_end_matches(' ').to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;
    use test_log::test;

    fn product_schema() -> Schema {
        Schema::new(vec![
            Column::new("id", ColumnType::Varchar(8)),
            Column::new("price", ColumnType::Float),
            Column::new("stock", ColumnType::Int),
            Column::new("added", ColumnType::Date),
        ])
        .expect("valid schema")
    }

    #[test]
    fn codec_roundtrip() -> crate::Result<()> {
        let schema = product_schema();
        let row = Row::new(vec![
            Value::Str("p1".into()),
            Value::Float(19.99),
            Value::Int(3),
            Value::Date("2024-05-01".into()),
        ]);

        let bytes = row.encode(&schema)?;
        assert_eq!(schema.record_size(), bytes.len());

        let decoded = Row::decode(&schema, &bytes)?;
        assert_eq!(row, decoded);
        assert!(!decoded.deleted);

        Ok(())
    }

    #[test]
    fn varchar_truncates_and_strips() -> crate::Result<()> {
        let schema = product_schema();
        let row = Row::new(vec![
            Value::Str("longer-than-eight".into()),
            Value::Float(1.0),
            Value::Int(0),
            Value::Date("2024-05-01".into()),
        ]);

        let decoded = Row::decode(&schema, &row.encode(&schema)?)?;
        assert_eq!(Some("longer-t"), decoded.values[0].as_str());

        Ok(())
    }

    #[test]
    fn tombstone_is_last_byte() -> crate::Result<()> {
        let schema = product_schema();
        let mut row = Row::new(vec![
            Value::Str("p1".into()),
            Value::Float(1.0),
            Value::Int(0),
            Value::Date("2024-05-01".into()),
        ]);
        row.deleted = true;

        let bytes = row.encode(&schema)?;
        assert_eq!(Some(&1), bytes.last());
        assert!(Row::decode(&schema, &bytes)?.deleted);

        Ok(())
    }

    #[test]
    fn wrong_length_is_invalid_record() {
        let schema = product_schema();
        let result = Row::decode(&schema, &[0; 7]);
        assert!(matches!(result, Err(Error::InvalidRecord(7, _))));
    }

    #[test]
    fn int_values_widen_into_float_columns() -> crate::Result<()> {
        let schema = product_schema();
        let row = Row::new(vec![
            Value::Str("p2".into()),
            Value::Int(20),
            Value::Int(1),
            Value::Date("2024-05-02".into()),
        ]);

        let decoded = Row::decode(&schema, &row.encode(&schema)?)?;
        assert_eq!(Value::Float(20.0), decoded.values[1]);

        Ok(())
    }
}
