//! PDF object types.

use crate::error::{Result, RptError};
use std::collections::HashMap;

/// Dictionary payload shared by dict and stream objects.
pub type Dict = HashMap<String, PdfObject>;

/// The fundamental PDF value type.
#[derive(Debug, Clone, PartialEq)]
pub enum PdfObject {
    Null,
    Bool(bool),
    Int(i64),
    Real(f64),
    /// Name object (e.g. /Type, /Pages)
    Name(String),
    /// String (byte array; PDF strings are not text)
    String(Vec<u8>),
    Array(Vec<Self>),
    Dict(Dict),
    /// Stream: dictionary attributes plus raw (still encoded) data
    Stream(Box<PdfStream>),
    /// Indirect object reference
    Ref(ObjRef),
}

impl PdfObject {
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_int(&self) -> Result<i64> {
        match self {
            Self::Int(n) => Ok(*n),
            _ => Err(self.type_error("int")),
        }
    }

    /// Numeric value, int or real coerced to f64.
    pub fn as_num(&self) -> Result<f64> {
        match self {
            Self::Int(n) => Ok(*n as f64),
            Self::Real(n) => Ok(*n),
            _ => Err(self.type_error("number")),
        }
    }

    pub fn as_name(&self) -> Result<&str> {
        match self {
            Self::Name(s) => Ok(s),
            _ => Err(self.type_error("name")),
        }
    }

    pub fn as_array(&self) -> Result<&Vec<Self>> {
        match self {
            Self::Array(arr) => Ok(arr),
            _ => Err(self.type_error("array")),
        }
    }

    pub fn as_dict(&self) -> Result<&Dict> {
        match self {
            Self::Dict(d) => Ok(d),
            _ => Err(self.type_error("dict")),
        }
    }

    pub fn as_stream(&self) -> Result<&PdfStream> {
        match self {
            Self::Stream(s) => Ok(s),
            _ => Err(self.type_error("stream")),
        }
    }

    pub fn as_objref(&self) -> Result<ObjRef> {
        match self {
            Self::Ref(r) => Ok(*r),
            _ => Err(self.type_error("ref")),
        }
    }

    fn type_error(&self, expected: &'static str) -> RptError {
        RptError::InvalidRpt(format!(
            "PDF type error: expected {expected}, got {}",
            self.type_name()
        ))
    }

    const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Real(_) => "real",
            Self::Name(_) => "name",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Dict(_) => "dict",
            Self::Stream(_) => "stream",
            Self::Ref(_) => "ref",
        }
    }
}

/// PDF indirect object reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjRef {
    pub objid: u32,
    pub genno: u16,
}

impl ObjRef {
    pub const fn new(objid: u32, genno: u16) -> Self {
        Self { objid, genno }
    }
}

/// PDF stream: dictionary attributes + raw data as found in the file.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfStream {
    pub attrs: Dict,
    pub rawdata: Vec<u8>,
}

impl PdfStream {
    pub fn new(attrs: Dict, rawdata: Vec<u8>) -> Self {
        Self { attrs, rawdata }
    }

    pub fn get(&self, name: &str) -> Option<&PdfObject> {
        self.attrs.get(name)
    }
}
