//! Order-preserving key encoding.
//!
//! Storage keys are compared as raw bytes, so the encoding must sort the same
//! way the logical keys do:
//!
//! - enum variants are prefixed with their index as one byte
//! - unsigned integers are big-endian, signed ones have the sign bit flipped
//! - byte strings and strings escape `0x00` as `0x00 0xff` and end with
//!   `0x00 0x00`, so a shorter string sorts before its extensions and a
//!   string prefix is a byte prefix of the encoded key up to the terminator
//!
//! Sequences and tuples are plain concatenations. Only the shapes used by
//! storage keys can be decoded.

use serde::{
    Deserialize, Serialize,
    de::{self, IntoDeserializer},
    ser,
};

use crate::error::{Error, Result};

pub fn serialize_key<T: Serialize + ?Sized>(key: &T) -> Result<Vec<u8>> {
    let mut ser = Serializer { output: Vec::new() };
    key.serialize(&mut ser)?;
    Ok(ser.output)
}

pub fn deserialize_key<'a, T: Deserialize<'a>>(input: &'a [u8]) -> Result<T> {
    let mut der = Deserializer { input };
    let value = T::deserialize(&mut der)?;
    if !der.input.is_empty() {
        return Err(Error::Internal(format!(
            "{} trailing bytes after key",
            der.input.len()
        )));
    }
    Ok(value)
}

pub struct Serializer {
    output: Vec<u8>,
}

impl Serializer {
    fn push_variant(&mut self, variant_index: u32) -> Result<()> {
        let index = u8::try_from(variant_index)
            .map_err(|_| Error::Internal(format!("variant index {} too large", variant_index)))?;
        self.output.push(index);
        Ok(())
    }
}

impl<'a> ser::Serializer for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = ser::Impossible<(), Error>;
    type SerializeStruct = ser::Impossible<(), Error>;
    type SerializeStructVariant = ser::Impossible<(), Error>;

    fn serialize_bool(self, v: bool) -> Result<()> {
        self.output.push(v as u8);
        Ok(())
    }

    fn serialize_i8(self, v: i8) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i16(self, v: i16) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i32(self, v: i32) -> Result<()> {
        self.serialize_i64(v as i64)
    }

    fn serialize_i64(self, v: i64) -> Result<()> {
        self.output
            .extend(((v as u64) ^ (1 << 63)).to_be_bytes());
        Ok(())
    }

    fn serialize_u8(self, v: u8) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u16(self, v: u16) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u32(self, v: u32) -> Result<()> {
        self.serialize_u64(v as u64)
    }

    fn serialize_u64(self, v: u64) -> Result<()> {
        self.output.extend(v.to_be_bytes());
        Ok(())
    }

    fn serialize_f32(self, _v: f32) -> Result<()> {
        Err(Error::Internal("floats cannot be used in keys".into()))
    }

    fn serialize_f64(self, _v: f64) -> Result<()> {
        Err(Error::Internal("floats cannot be used in keys".into()))
    }

    fn serialize_char(self, v: char) -> Result<()> {
        let mut buf = [0; 4];
        self.serialize_str(v.encode_utf8(&mut buf))
    }

    fn serialize_str(self, v: &str) -> Result<()> {
        self.serialize_bytes(v.as_bytes())
    }

    fn serialize_bytes(self, v: &[u8]) -> Result<()> {
        for byte in v {
            match byte {
                0 => self.output.extend([0, 0xff]),
                b => self.output.push(*b),
            }
        }
        self.output.extend([0, 0]);
        Ok(())
    }

    fn serialize_none(self) -> Result<()> {
        self.output.push(0);
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Result<()> {
        self.output.push(1);
        value.serialize(self)
    }

    fn serialize_unit(self) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_struct(self, _name: &'static str) -> Result<()> {
        Ok(())
    }

    fn serialize_unit_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
    ) -> Result<()> {
        self.push_variant(variant_index)
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        value: &T,
    ) -> Result<()> {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        value: &T,
    ) -> Result<()> {
        self.push_variant(variant_index)?;
        value.serialize(self)
    }

    fn serialize_seq(self, _len: Option<usize>) -> Result<Self::SerializeSeq> {
        Ok(self)
    }

    fn serialize_tuple(self, _len: usize) -> Result<Self::SerializeTuple> {
        Ok(self)
    }

    fn serialize_tuple_struct(
        self,
        _name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleStruct> {
        Ok(self)
    }

    fn serialize_tuple_variant(
        self,
        _name: &'static str,
        variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeTupleVariant> {
        self.push_variant(variant_index)?;
        Ok(self)
    }

    fn serialize_map(self, _len: Option<usize>) -> Result<Self::SerializeMap> {
        Err(Error::Internal("maps cannot be used in keys".into()))
    }

    fn serialize_struct(
        self,
        name: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStruct> {
        Err(Error::Internal(format!("struct {} cannot be used in keys", name)))
    }

    fn serialize_struct_variant(
        self,
        name: &'static str,
        _variant_index: u32,
        _variant: &'static str,
        _len: usize,
    ) -> Result<Self::SerializeStructVariant> {
        Err(Error::Internal(format!("struct variant of {} cannot be used in keys", name)))
    }
}

impl<'a> ser::SerializeSeq for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a> ser::SerializeTuple for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleStruct for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

impl<'a> ser::SerializeTupleVariant for &'a mut Serializer {
    type Ok = ();
    type Error = Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Result<()> {
        value.serialize(&mut **self)
    }

    fn end(self) -> Result<()> {
        Ok(())
    }
}

pub struct Deserializer<'de> {
    input: &'de [u8],
}

impl<'de> Deserializer<'de> {
    fn take(&mut self, len: usize) -> Result<&'de [u8]> {
        if self.input.len() < len {
            return Err(Error::Internal(format!(
                "key too short: wanted {} bytes, {} left",
                len,
                self.input.len()
            )));
        }
        let (taken, rest) = self.input.split_at(len);
        self.input = rest;
        Ok(taken)
    }

    fn take_escaped(&mut self) -> Result<Vec<u8>> {
        let mut decoded = Vec::new();
        let mut iter = self.input.iter().enumerate();
        let consumed = loop {
            match iter.next() {
                Some((_, 0)) => match iter.next() {
                    Some((i, 0)) => break i + 1,
                    Some((_, 0xff)) => decoded.push(0),
                    _ => return Err(Error::Internal("invalid escape sequence in key".into())),
                },
                Some((_, b)) => decoded.push(*b),
                None => return Err(Error::Internal("unterminated byte string in key".into())),
            }
        };
        self.input = &self.input[consumed..];
        Ok(decoded)
    }
}

impl<'de> de::Deserializer<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn deserialize_any<V: de::Visitor<'de>>(self, _visitor: V) -> Result<V::Value> {
        Err(Error::Internal("key decoding needs a known type".into()))
    }

    fn deserialize_bool<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.take(1)?[0] {
            0 => visitor.visit_bool(false),
            1 => visitor.visit_bool(true),
            b => Err(Error::Internal(format!("invalid boolean {} in key", b))),
        }
    }

    fn deserialize_i64<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let bytes: [u8; 8] = self.take(8)?.try_into()?;
        visitor.visit_i64((u64::from_be_bytes(bytes) ^ (1 << 63)) as i64)
    }

    fn deserialize_u64<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let bytes: [u8; 8] = self.take(8)?.try_into()?;
        visitor.visit_u64(u64::from_be_bytes(bytes))
    }

    fn deserialize_str<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(String::from_utf8(self.take_escaped()?)?)
    }

    fn deserialize_string<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_str(visitor)
    }

    fn deserialize_bytes<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.take_escaped()?)
    }

    fn deserialize_byte_buf<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.take_escaped()?)
    }

    fn deserialize_option<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        match self.take(1)?[0] {
            0 => visitor.visit_none(),
            1 => visitor.visit_some(self),
            b => Err(Error::Internal(format!("invalid option tag {} in key", b))),
        }
    }

    fn deserialize_unit<V: de::Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_tuple<V: de::Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(self)
    }

    fn deserialize_enum<V: de::Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_enum(self)
    }

    serde::forward_to_deserialize_any! {
        i8 i16 i32 u8 u16 u32 f32 f64 char unit_struct seq tuple_struct
        map struct identifier ignored_any
    }
}

impl<'de> de::SeqAccess<'de> for Deserializer<'de> {
    type Error = Error;

    fn next_element_seed<T: de::DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>> {
        seed.deserialize(self).map(Some)
    }
}

impl<'de> de::EnumAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;
    type Variant = Self;

    fn variant_seed<V: de::DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self)> {
        let index = self.take(1)?[0] as u32;
        let value: Result<_> = seed.deserialize(index.into_deserializer());
        Ok((value?, self))
    }
}

impl<'de> de::VariantAccess<'de> for &mut Deserializer<'de> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        Ok(())
    }

    fn newtype_variant_seed<T: de::DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: de::Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        visitor.visit_seq(self)
    }

    fn struct_variant<V: de::Visitor<'de>>(
        self,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value> {
        Err(Error::Internal("struct variants cannot be decoded from keys".into()))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::{deserialize_key, serialize_key};
    use crate::error::Result;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    enum Key {
        Counter,
        Marker(u64),
        Entry(#[serde(with = "serde_bytes")] Vec<u8>, u64),
        Named(String, i64),
    }

    #[test]
    fn test_integers_sort_numerically() -> Result<()> {
        let encoded = [-550i64, -1, 0, 1, 77, 550]
            .iter()
            .map(serialize_key)
            .collect::<Result<Vec<_>>>()?;
        assert!(encoded.windows(2).all(|w| w[0] < w[1]));

        assert!(serialize_key(&255u64)? < serialize_key(&256u64)?);
        Ok(())
    }

    #[test]
    fn test_strings_sort_and_prefix() -> Result<()> {
        let short = serialize_key(&Key::Named("patient".into(), 1))?;
        let long = serialize_key(&Key::Named("patients".into(), 0))?;
        assert!(short < long);

        // a string key is a byte prefix of any key extending it
        let mut prefix = serialize_key(&Key::Named("patient".into(), 0))?;
        prefix.truncate(prefix.len() - 8);
        assert!(short.starts_with(&prefix));
        assert!(!long.starts_with(&prefix));
        Ok(())
    }

    #[test]
    fn test_embedded_zero_bytes() -> Result<()> {
        let key = Key::Entry(vec![0, 1, 0, 0xff], 9);
        let encoded = serialize_key(&key)?;
        assert_eq!(
            encoded[..9].to_vec(),
            vec![2, 0, 0xff, 1, 0, 0xff, 0xff, 0, 0]
        );
        assert_eq!(deserialize_key::<Key>(&encoded)?, key);
        Ok(())
    }

    #[test]
    fn test_decode_variants() -> Result<()> {
        for key in [
            Key::Counter,
            Key::Marker(42),
            Key::Entry(b"appointment".to_vec(), 3),
            Key::Named("doctor".into(), -10),
        ] {
            let encoded = serialize_key(&key)?;
            assert_eq!(deserialize_key::<Key>(&encoded)?, key);
        }
        assert!(deserialize_key::<Key>(&[1, 0, 0]).is_err());
        Ok(())
    }
}
