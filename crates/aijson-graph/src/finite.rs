//! Locates non-finite floats inside a serializable value.
//!
//! `serde_json::to_value` writes NaN and the infinities as `null`, so a
//! literal has to be walked before the JSON conversion for the capture to
//! stay lossless.

use serde::ser::{self, Serialize};
use serde_json::Value;
use std::fmt;

/// Path of the first non-finite float in `value`, relative to the value
/// itself (`""`, `"[1]"`, `".layers[0].scale"`), or `None` if every float
/// is finite. Serialization failures other than a non-finite float are left
/// for the JSON conversion to report.
pub(crate) fn non_finite_path<S: Serialize + ?Sized>(value: &S) -> Option<String> {
    match value.serialize(FiniteCheck { path: String::new() }) {
        Err(CheckError::NonFinite(path)) => Some(path),
        Err(CheckError::Other(_)) | Ok(()) => None,
    }
}

#[derive(Debug)]
enum CheckError {
    NonFinite(String),
    Other(String),
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckError::NonFinite(path) => write!(f, "non-finite number at `{path}`"),
            CheckError::Other(message) => f.write_str(message),
        }
    }
}

impl std::error::Error for CheckError {}

impl ser::Error for CheckError {
    fn custom<T: fmt::Display>(msg: T) -> Self {
        CheckError::Other(msg.to_string())
    }
}

type Checked = Result<(), CheckError>;

struct FiniteCheck {
    path: String,
}

impl FiniteCheck {
    fn float(self, finite: bool) -> Checked {
        if finite { Ok(()) } else { Err(CheckError::NonFinite(self.path)) }
    }

    fn field(&self, name: &str) -> String {
        format!("{}.{name}", self.path)
    }
}

/// Map keys are named the way they will appear in the JSON object.
fn key_name<K: Serialize + ?Sized>(key: &K) -> String {
    match serde_json::to_value(key) {
        Ok(Value::String(key)) => key,
        Ok(other) => other.to_string(),
        Err(_) => String::new(),
    }
}

impl ser::Serializer for FiniteCheck {
    type Ok = ();
    type Error = CheckError;
    type SerializeSeq = Elements;
    type SerializeTuple = Elements;
    type SerializeTupleStruct = Elements;
    type SerializeTupleVariant = Elements;
    type SerializeMap = Entries;
    type SerializeStruct = Fields;
    type SerializeStructVariant = Fields;

    fn serialize_bool(self, _: bool) -> Checked {
        Ok(())
    }

    fn serialize_i8(self, _: i8) -> Checked {
        Ok(())
    }

    fn serialize_i16(self, _: i16) -> Checked {
        Ok(())
    }

    fn serialize_i32(self, _: i32) -> Checked {
        Ok(())
    }

    fn serialize_i64(self, _: i64) -> Checked {
        Ok(())
    }

    fn serialize_u8(self, _: u8) -> Checked {
        Ok(())
    }

    fn serialize_u16(self, _: u16) -> Checked {
        Ok(())
    }

    fn serialize_u32(self, _: u32) -> Checked {
        Ok(())
    }

    fn serialize_u64(self, _: u64) -> Checked {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Checked {
        self.float(v.is_finite())
    }

    fn serialize_f64(self, v: f64) -> Checked {
        self.float(v.is_finite())
    }

    fn serialize_char(self, _: char) -> Checked {
        Ok(())
    }

    fn serialize_str(self, _: &str) -> Checked {
        Ok(())
    }

    fn serialize_bytes(self, _: &[u8]) -> Checked {
        Ok(())
    }

    fn serialize_none(self) -> Checked {
        Ok(())
    }

    fn serialize_some<T: Serialize + ?Sized>(self, value: &T) -> Checked {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Checked {
        Ok(())
    }

    fn serialize_unit_struct(self, _: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Checked {
        Ok(())
    }

    fn serialize_newtype_struct<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        value: &T,
    ) -> Checked {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: Serialize + ?Sized>(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        value: &T,
    ) -> Checked {
        let path = self.field(variant);
        value.serialize(FiniteCheck { path })
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Elements, CheckError> {
        Ok(Elements { path: self.path, index: 0 })
    }

    fn serialize_tuple(self, _: usize) -> Result<Elements, CheckError> {
        Ok(Elements { path: self.path, index: 0 })
    }

    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Elements, CheckError> {
        Ok(Elements { path: self.path, index: 0 })
    }

    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Elements, CheckError> {
        Ok(Elements { path: self.field(variant), index: 0 })
    }

    fn serialize_map(self, _: Option<usize>) -> Result<Entries, CheckError> {
        Ok(Entries { path: self.path, key: None })
    }

    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Fields, CheckError> {
        Ok(Fields { path: self.path })
    }

    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        variant: &'static str,
        _: usize,
    ) -> Result<Fields, CheckError> {
        Ok(Fields { path: self.field(variant) })
    }
}

struct Elements {
    path: String,
    index: usize,
}

impl Elements {
    fn element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        let path = format!("{}[{}]", self.path, self.index);
        self.index += 1;
        value.serialize(FiniteCheck { path })
    }
}

impl ser::SerializeSeq for Elements {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        self.element(value)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTuple for Elements {
    type Ok = ();
    type Error = CheckError;

    fn serialize_element<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        self.element(value)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for Elements {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        self.element(value)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for Elements {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        self.element(value)
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

struct Entries {
    path: String,
    key: Option<String>,
}

impl ser::SerializeMap for Entries {
    type Ok = ();
    type Error = CheckError;

    fn serialize_key<T: Serialize + ?Sized>(&mut self, key: &T) -> Checked {
        self.key = Some(key_name(key));
        Ok(())
    }

    fn serialize_value<T: Serialize + ?Sized>(&mut self, value: &T) -> Checked {
        let key = self.key.take().unwrap_or_default();
        value.serialize(FiniteCheck { path: format!("{}.{key}", self.path) })
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

struct Fields {
    path: String,
}

impl ser::SerializeStruct for Fields {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Checked {
        value.serialize(FiniteCheck { path: format!("{}.{key}", self.path) })
    }

    fn end(self) -> Checked {
        Ok(())
    }
}

impl ser::SerializeStructVariant for Fields {
    type Ok = ();
    type Error = CheckError;

    fn serialize_field<T: Serialize + ?Sized>(&mut self, key: &'static str, value: &T) -> Checked {
        value.serialize(FiniteCheck { path: format!("{}.{key}", self.path) })
    }

    fn end(self) -> Checked {
        Ok(())
    }
}
