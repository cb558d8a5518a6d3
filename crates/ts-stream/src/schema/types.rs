//! Element and field types.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, StreamError};

/// Element type of a field (the canonical, folded type set).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    /// Boolean, stored as one byte.
    Bool,
    /// 32-bit signed integer (also short, char, int32, uchar).
    Int,
    /// 32-bit unsigned integer (also ushort).
    UInt,
    /// 64-bit integer (long, long64, ulong64).
    Long,
    /// 32-bit float.
    Float,
    /// 64-bit float.
    Double,
    /// Length-prefixed string.
    Str,
}

impl ElemType {
    /// Fixed size in bytes of one element, `None` for strings.
    pub fn byte_size(self) -> Option<usize> {
        match self {
            ElemType::Bool => Some(1),
            ElemType::Int | ElemType::UInt | ElemType::Float => Some(4),
            ElemType::Long | ElemType::Double => Some(8),
            ElemType::Str => None,
        }
    }

    /// Canonical type name as written to `variables.txt`.
    pub fn name(self) -> &'static str {
        match self {
            ElemType::Bool => "bool",
            ElemType::Int => "int",
            ElemType::UInt => "uint",
            ElemType::Long => "long",
            ElemType::Float => "float",
            ElemType::Double => "double",
            ElemType::Str => "string",
        }
    }

    /// On-disk type code.
    pub fn code(self) -> u8 {
        match self {
            ElemType::Bool => 1,
            ElemType::Int => 2,
            ElemType::UInt => 3,
            ElemType::Long => 4,
            ElemType::Float => 5,
            ElemType::Double => 6,
            ElemType::Str => 7,
        }
    }

    /// Inverse of [`ElemType::code`].
    pub fn from_code(code: u8) -> Result<Self> {
        Ok(match code {
            1 => ElemType::Bool,
            2 => ElemType::Int,
            3 => ElemType::UInt,
            4 => ElemType::Long,
            5 => ElemType::Float,
            6 => ElemType::Double,
            7 => ElemType::Str,
            other => {
                return Err(StreamError::Deserialization(format!("unknown type code {other}")));
            }
        })
    }

    /// Whether values are numeric (bool counts as numeric for casting).
    pub fn is_numeric(self) -> bool {
        !matches!(self, ElemType::Str)
    }

    /// Fold a normalized scalar type name into the canonical set.
    ///
    /// `name` must already be lower-cased with `_t` and `std::` removed.
    pub fn from_normalized(name: &str) -> Option<Self> {
        let elem = match name.trim() {
            "bool" | "boolean" => ElemType::Bool,
            "int" | "int32" | "short" | "int16" | "char" | "uchar" | "int8" | "signed" => {
                ElemType::Int
            }
            "uint" | "unsigned" | "unsigned int" | "uint32" | "ushort" | "unsigned short"
            | "uint16" => ElemType::UInt,
            "long" | "long64" | "ulong64" | "ulong" | "unsigned long" | "long long" | "int64"
            | "uint64" => ElemType::Long,
            "float" | "float32" => ElemType::Float,
            "double" | "double32" | "float64" => ElemType::Double,
            "string" | "tstring" => ElemType::Str,
            _ => return None,
        };
        Some(elem)
    }
}

impl fmt::Display for ElemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declared type of a schema row: an element type, optionally wrapped in a vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FieldType {
    /// Element type.
    pub elem: ElemType,
    /// `vector<elem>` rather than a scalar / counter-linked array.
    pub is_vector: bool,
}

impl FieldType {
    /// Scalar (or counter-linked array) of `elem`.
    pub fn scalar(elem: ElemType) -> Self {
        Self { elem, is_vector: false }
    }

    /// `vector<elem>`.
    pub fn vector(elem: ElemType) -> Self {
        Self { elem, is_vector: true }
    }

    /// Parse a raw type token (`Double_t`, `vector<float>`, `std::vector<int>`, `uint`, ...).
    pub fn parse(raw: &str) -> Result<Self> {
        let lowered = raw.trim().to_ascii_lowercase().replace("std::", "").replace("_t", "");
        if let Some(start) = lowered.find("vector<") {
            let inner_start = start + "vector<".len();
            let inner = match lowered.rfind('>') {
                Some(end) if end > inner_start => lowered[inner_start..end].trim(),
                _ => "",
            };
            if inner.is_empty() {
                return Err(StreamError::UnsupportedType(format!(
                    "unable to extract element type from '{raw}'"
                )));
            }
            let elem = ElemType::from_normalized(inner)
                .ok_or_else(|| StreamError::UnsupportedType(raw.to_string()))?;
            return Ok(Self::vector(elem));
        }
        ElemType::from_normalized(&lowered)
            .map(Self::scalar)
            .ok_or_else(|| StreamError::UnsupportedType(raw.to_string()))
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_vector {
            write!(f, "vector<{}>", self.elem)
        } else {
            write!(f, "{}", self.elem)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_type_names_fold() {
        assert_eq!(FieldType::parse("Double_t").unwrap(), FieldType::scalar(ElemType::Double));
        assert_eq!(FieldType::parse("Long64_t").unwrap(), FieldType::scalar(ElemType::Long));
        assert_eq!(FieldType::parse("ULong64_t").unwrap(), FieldType::scalar(ElemType::Long));
        assert_eq!(FieldType::parse("UInt_t").unwrap(), FieldType::scalar(ElemType::UInt));
        assert_eq!(FieldType::parse("uchar").unwrap(), FieldType::scalar(ElemType::Int));
        assert_eq!(FieldType::parse("Bool_t").unwrap(), FieldType::scalar(ElemType::Bool));
    }

    #[test]
    fn vector_types() {
        assert_eq!(FieldType::parse("vector<float>").unwrap(), FieldType::vector(ElemType::Float));
        assert_eq!(
            FieldType::parse("std::vector<Int_t>").unwrap(),
            FieldType::vector(ElemType::Int)
        );
        assert_eq!(FieldType::vector(ElemType::Double).to_string(), "vector<double>");
    }

    #[test]
    fn empty_vector_element_is_unsupported() {
        assert!(matches!(FieldType::parse("vector<>"), Err(StreamError::UnsupportedType(_))));
        assert!(matches!(FieldType::parse("TClonesArray"), Err(StreamError::UnsupportedType(_))));
    }

    #[test]
    fn codes_round_trip() {
        for e in [
            ElemType::Bool,
            ElemType::Int,
            ElemType::UInt,
            ElemType::Long,
            ElemType::Float,
            ElemType::Double,
            ElemType::Str,
        ] {
            assert_eq!(ElemType::from_code(e.code()).unwrap(), e);
        }
    }
}
