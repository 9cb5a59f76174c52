//! Cursor-style reader and writer for the AMQP wire domains.
//!
//! Every multi-byte integer is big-endian. Field values use the single
//! letter tags from the 0-9-1 errata; consecutive bit fields of a method
//! are packed into shared octets by the registry, not here.

use crate::buffer::Buffer;
use crate::frame::FrameError;
use crate::types::{AMQPValue, FieldTable, LongString, ShortString};

pub(crate) struct FrameReader<'a> {
    data: &'a [u8],
}

impl<'a> FrameReader<'a> {
    pub(crate) fn new(data: &'a [u8]) -> FrameReader<'a> {
        Self { data }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len()
    }

    fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], FrameError> {
        if self.data.len() < count {
            return Err(FrameError::Truncated);
        }
        let (head, tail) = self.data.split_at(count);
        self.data = tail;
        Ok(head)
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, FrameError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub(crate) fn read_i8(&mut self) -> Result<i8, FrameError> {
        Ok(self.read_u8()? as i8)
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, FrameError> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub(crate) fn read_i16(&mut self) -> Result<i16, FrameError> {
        Ok(self.read_u16()? as i16)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, FrameError> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub(crate) fn read_i32(&mut self) -> Result<i32, FrameError> {
        Ok(self.read_u32()? as i32)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, FrameError> {
        let bytes = self.read_bytes(8)?;
        let mut buffer = [0; 8];
        buffer.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(buffer))
    }

    pub(crate) fn read_i64(&mut self) -> Result<i64, FrameError> {
        Ok(self.read_u64()? as i64)
    }

    pub(crate) fn read_f32(&mut self) -> Result<f32, FrameError> {
        Ok(f32::from_bits(self.read_u32()?))
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, FrameError> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    pub(crate) fn read_short_string(&mut self) -> Result<ShortString, FrameError> {
        let length = self.read_u8()? as usize;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::Utf8)
    }

    pub(crate) fn read_long_string(&mut self) -> Result<String, FrameError> {
        let length = self.read_u32()? as usize;
        let bytes = self.read_bytes(length)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| FrameError::Utf8)
    }

    pub(crate) fn read_long_bytes(&mut self) -> Result<LongString, FrameError> {
        let length = self.read_u32()? as usize;
        Ok(self.read_bytes(length)?.to_vec())
    }

    pub(crate) fn read_table(&mut self) -> Result<FieldTable, FrameError> {
        let size = self.read_u32()? as usize;
        if self.data.len() < size {
            return Err(FrameError::Truncated);
        }
        let mut table = FrameReader::new(&self.data[..size]);
        self.data = &self.data[size..];
        let mut result = FieldTable::default();
        while table.remaining() > 0 {
            let key = table.read_short_string()?;
            let value = table.read_value()?;
            result.insert(key, value);
        }
        Ok(result)
    }

    fn read_array(&mut self) -> Result<Vec<AMQPValue>, FrameError> {
        let size = self.read_u32()? as usize;
        if self.data.len() < size {
            return Err(FrameError::Truncated);
        }
        let mut items = FrameReader::new(&self.data[..size]);
        self.data = &self.data[size..];
        let mut result = Vec::new();
        while items.remaining() > 0 {
            result.push(items.read_value()?);
        }
        Ok(result)
    }

    pub(crate) fn read_value(&mut self) -> Result<AMQPValue, FrameError> {
        let tag = self.read_u8()?;
        match tag {
            b't' => Ok(AMQPValue::Boolean(self.read_u8()? != 0)),
            b'b' => Ok(AMQPValue::ShortShortInt(self.read_i8()?)),
            b'B' => Ok(AMQPValue::ShortShortUInt(self.read_u8()?)),
            b'U' => Ok(AMQPValue::ShortInt(self.read_i16()?)),
            b'u' => Ok(AMQPValue::ShortUInt(self.read_u16()?)),
            b'I' => Ok(AMQPValue::LongInt(self.read_i32()?)),
            b'i' => Ok(AMQPValue::LongUInt(self.read_u32()?)),
            b'L' => Ok(AMQPValue::LongLongInt(self.read_i64()?)),
            b'l' => Ok(AMQPValue::LongLongUInt(self.read_u64()?)),
            b'f' => Ok(AMQPValue::Float(self.read_f32()?)),
            b'd' => Ok(AMQPValue::Double(self.read_f64()?)),
            b'D' => Ok(AMQPValue::DecimalValue(self.read_u8()?, self.read_u32()?)),
            b's' => Ok(AMQPValue::ShortString(self.read_short_string()?)),
            b'S' => Ok(AMQPValue::LongString(self.read_long_string()?)),
            b'A' => Ok(AMQPValue::FieldArray(self.read_array()?)),
            b'T' => Ok(AMQPValue::Timestamp(self.read_u64()?)),
            b'F' => Ok(AMQPValue::FieldTable(self.read_table()?)),
            b'V' => Ok(AMQPValue::Void),
            tag => Err(FrameError::InvalidFieldType(tag)),
        }
    }
}

pub(crate) struct FrameWriter<'a> {
    buf: &'a mut Buffer,
}

impl<'a> FrameWriter<'a> {
    pub(crate) fn new(buf: &'a mut Buffer) -> FrameWriter<'a> {
        Self { buf }
    }

    pub(crate) fn write_u8(&mut self, value: u8) {
        self.buf.push_u8(value);
    }

    pub(crate) fn write_i8(&mut self, value: i8) {
        self.buf.push_u8(value as u8);
    }

    pub(crate) fn write_u16(&mut self, value: u16) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_i16(&mut self, value: i16) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_u32(&mut self, value: u32) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_i32(&mut self, value: i32) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_u64(&mut self, value: u64) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_i64(&mut self, value: i64) {
        self.buf.push(&value.to_be_bytes());
    }

    pub(crate) fn write_f32(&mut self, value: f32) {
        self.write_u32(value.to_bits());
    }

    pub(crate) fn write_f64(&mut self, value: f64) {
        self.write_u64(value.to_bits());
    }

    pub(crate) fn write_bytes(&mut self, data: &[u8]) {
        self.buf.push(data);
    }

    pub(crate) fn write_short_string(&mut self, value: &str) -> Result<(), FrameError> {
        if value.len() > u8::MAX as usize {
            return Err(FrameError::StringTooLong(value.len()));
        }
        self.write_u8(value.len() as u8);
        self.buf.push(value.as_bytes());
        Ok(())
    }

    pub(crate) fn write_long_string(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.buf.push(value.as_bytes());
    }

    pub(crate) fn write_long_bytes(&mut self, value: &[u8]) {
        self.write_u32(value.len() as u32);
        self.buf.push(value);
    }

    pub(crate) fn write_table(&mut self, table: &FieldTable) -> Result<(), FrameError> {
        let size_at = self.buf.checkpoint();
        self.write_u32(0);
        for (key, value) in table {
            self.write_short_string(key)?;
            self.write_value(value)?;
        }
        let written = self.buf.written_since(size_at) - 4;
        self.buf.patch_u32(size_at, 0, written as u32);
        Ok(())
    }

    fn write_array(&mut self, items: &[AMQPValue]) -> Result<(), FrameError> {
        let size_at = self.buf.checkpoint();
        self.write_u32(0);
        for item in items {
            self.write_value(item)?;
        }
        let written = self.buf.written_since(size_at) - 4;
        self.buf.patch_u32(size_at, 0, written as u32);
        Ok(())
    }

    pub(crate) fn write_value(&mut self, value: &AMQPValue) -> Result<(), FrameError> {
        match value {
            AMQPValue::Boolean(b) => {
                self.write_u8(b't');
                self.write_u8(u8::from(*b));
            }
            AMQPValue::ShortShortInt(i) => {
                self.write_u8(b'b');
                self.write_i8(*i);
            }
            AMQPValue::ShortShortUInt(i) => {
                self.write_u8(b'B');
                self.write_u8(*i);
            }
            AMQPValue::ShortInt(i) => {
                self.write_u8(b'U');
                self.write_i16(*i);
            }
            AMQPValue::ShortUInt(i) => {
                self.write_u8(b'u');
                self.write_u16(*i);
            }
            AMQPValue::LongInt(i) => {
                self.write_u8(b'I');
                self.write_i32(*i);
            }
            AMQPValue::LongUInt(i) => {
                self.write_u8(b'i');
                self.write_u32(*i);
            }
            AMQPValue::LongLongInt(i) => {
                self.write_u8(b'L');
                self.write_i64(*i);
            }
            AMQPValue::LongLongUInt(i) => {
                self.write_u8(b'l');
                self.write_u64(*i);
            }
            AMQPValue::Float(f) => {
                self.write_u8(b'f');
                self.write_f32(*f);
            }
            AMQPValue::Double(d) => {
                self.write_u8(b'd');
                self.write_f64(*d);
            }
            AMQPValue::DecimalValue(scale, value) => {
                self.write_u8(b'D');
                self.write_u8(*scale);
                self.write_u32(*value);
            }
            AMQPValue::ShortString(s) => {
                self.write_u8(b's');
                self.write_short_string(s)?;
            }
            AMQPValue::LongString(s) => {
                self.write_u8(b'S');
                self.write_long_string(s);
            }
            AMQPValue::FieldArray(items) => {
                self.write_u8(b'A');
                self.write_array(items)?;
            }
            AMQPValue::Timestamp(t) => {
                self.write_u8(b'T');
                self.write_u64(*t);
            }
            AMQPValue::FieldTable(t) => {
                self.write_u8(b'F');
                self.write_table(t)?;
            }
            AMQPValue::Void => self.write_u8(b'V'),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_table(table: &FieldTable) -> FieldTable {
        let mut buf = Buffer::with_capacity(256);
        FrameWriter::new(&mut buf).write_table(table).unwrap();
        let mut reader = FrameReader::new(buf.data());
        let decoded = reader.read_table().unwrap();
        assert_eq!(reader.remaining(), 0);
        decoded
    }

    #[test]
    fn empty_table_is_four_zero_bytes() {
        let mut buf = Buffer::with_capacity(16);
        FrameWriter::new(&mut buf)
            .write_table(&FieldTable::default())
            .unwrap();
        assert_eq!(buf.data(), &[0, 0, 0, 0]);
    }

    #[test]
    fn table_roundtrip() {
        let mut table = FieldTable::default();
        table.insert("LOGIN".into(), AMQPValue::LongString("guest".into()));
        table.insert("attempt".into(), AMQPValue::LongInt(-7));
        table.insert("flag".into(), AMQPValue::Boolean(true));
        table.insert("stamp".into(), AMQPValue::Timestamp(1_234_567));
        let mut nested = FieldTable::default();
        nested.insert("depth".into(), AMQPValue::ShortShortUInt(2));
        table.insert("nested".into(), AMQPValue::FieldTable(nested));
        table.insert(
            "list".into(),
            AMQPValue::FieldArray(vec![AMQPValue::Void, AMQPValue::ShortString("x".into())]),
        );
        assert_eq!(roundtrip_table(&table), table);
    }

    #[test]
    fn short_string_length_is_limited() {
        let mut buf = Buffer::with_capacity(512);
        let long = "x".repeat(256);
        let err = FrameWriter::new(&mut buf)
            .write_short_string(&long)
            .unwrap_err();
        assert!(matches!(err, FrameError::StringTooLong(256)));
    }

    #[test]
    fn truncated_input_is_detected() {
        let mut reader = FrameReader::new(&[0, 0, 0, 9, 1]);
        assert!(matches!(reader.read_table(), Err(FrameError::Truncated)));
    }
}
