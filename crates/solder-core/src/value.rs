//! Managed value and carrier model
//!
//! A `Carrier` names the managed-side type of one argument or return value;
//! a `Value` is a runtime instance of a carrier. Struct values are owned
//! byte images of a group layout.
//!
//! Conversion to and from 64-bit storage slot words implements the
//! write-oversized rule: integers narrower than a register are sign-extended
//! to fill the whole slot on write, and only the declared width is
//! interpreted on read. Floats travel as raw bits so that no rounding or
//! NaN canonicalization happens in transit.

use crate::layout::{Layout, LayoutNode, ScalarKind};

/// Managed-side type of an argument or return value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Carrier {
    /// 8-bit signed integer.
    I8,
    /// 16-bit signed integer.
    I16,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// Raw native pointer.
    Ptr,
    /// Struct passed or returned by value (a byte image of a group layout).
    Struct,
}

impl Carrier {
    /// Declared byte width of the carrier; structs have no fixed width.
    pub fn byte_size(&self) -> Option<usize> {
        match self {
            Carrier::I8 => Some(1),
            Carrier::I16 => Some(2),
            Carrier::I32 => Some(4),
            Carrier::I64 | Carrier::Ptr => Some(8),
            Carrier::F32 => Some(4),
            Carrier::F64 => Some(8),
            Carrier::Struct => None,
        }
    }

    /// True for the floating-point carriers.
    pub fn is_float(&self) -> bool {
        matches!(self, Carrier::F32 | Carrier::F64)
    }

    /// Whether this carrier can legally describe the given native layout.
    pub fn is_compatible_with(&self, layout: &Layout) -> bool {
        match (self, layout.node()) {
            (Carrier::Struct, LayoutNode::Group { .. }) => true,
            (Carrier::Ptr, LayoutNode::Scalar { kind, .. }) => *kind == ScalarKind::Pointer,
            (c, LayoutNode::Scalar { size, kind }) => {
                let width = match c.byte_size() {
                    Some(w) => w,
                    None => return false,
                };
                width == *size
                    && match kind {
                        ScalarKind::Int => !c.is_float(),
                        ScalarKind::Float => c.is_float(),
                        ScalarKind::Pointer => false,
                    }
            }
            _ => false,
        }
    }
}

/// A runtime value crossing the managed/native boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 8-bit signed integer.
    I8(i8),
    /// 16-bit signed integer.
    I16(i16),
    /// 32-bit signed integer.
    I32(i32),
    /// 64-bit signed integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
    /// Raw native pointer.
    Ptr(u64),
    /// Struct byte image.
    Struct(Vec<u8>),
}

impl Value {
    /// The carrier of this value.
    pub fn carrier(&self) -> Carrier {
        match self {
            Value::I8(_) => Carrier::I8,
            Value::I16(_) => Carrier::I16,
            Value::I32(_) => Carrier::I32,
            Value::I64(_) => Carrier::I64,
            Value::F32(_) => Carrier::F32,
            Value::F64(_) => Carrier::F64,
            Value::Ptr(_) => Carrier::Ptr,
            Value::Struct(_) => Carrier::Struct,
        }
    }

    /// Encode a scalar value as a full 64-bit slot word (write-oversized).
    ///
    /// Integers are sign-extended to 64 bits; floats contribute their raw
    /// bits zero-extended. Struct values have no single-word encoding.
    pub fn to_slot_word(&self) -> Option<u64> {
        match self {
            Value::I8(v) => Some(*v as i64 as u64),
            Value::I16(v) => Some(*v as i64 as u64),
            Value::I32(v) => Some(*v as i64 as u64),
            Value::I64(v) => Some(*v as u64),
            Value::F32(v) => Some(v.to_bits() as u64),
            Value::F64(v) => Some(v.to_bits()),
            Value::Ptr(v) => Some(*v),
            Value::Struct(_) => None,
        }
    }

    /// Decode a scalar value of the given carrier from a slot word,
    /// interpreting only the declared width and ignoring upper garbage.
    pub fn from_slot_word(carrier: Carrier, word: u64) -> Option<Value> {
        match carrier {
            Carrier::I8 => Some(Value::I8(word as u8 as i8)),
            Carrier::I16 => Some(Value::I16(word as u16 as i16)),
            Carrier::I32 => Some(Value::I32(word as u32 as i32)),
            Carrier::I64 => Some(Value::I64(word as i64)),
            Carrier::F32 => Some(Value::F32(f32::from_bits(word as u32))),
            Carrier::F64 => Some(Value::F64(f64::from_bits(word))),
            Carrier::Ptr => Some(Value::Ptr(word)),
            Carrier::Struct => None,
        }
    }

    /// The byte image of a struct value.
    pub fn struct_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Struct(bytes) => Some(bytes),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_oversized_sign_extends() {
        assert_eq!(Value::I8(-1).to_slot_word(), Some(u64::MAX));
        assert_eq!(Value::I16(-2).to_slot_word(), Some(0xFFFF_FFFF_FFFF_FFFE));
        assert_eq!(Value::I32(5).to_slot_word(), Some(5));
    }

    #[test]
    fn test_readback_ignores_upper_garbage() {
        // garbage in the upper bits of the slot must not leak into narrow reads
        let word = 0xDEAD_BEEF_0000_002A;
        assert_eq!(Value::from_slot_word(Carrier::I8, word), Some(Value::I8(42)));
        assert_eq!(
            Value::from_slot_word(Carrier::I32, word),
            Some(Value::I32(42))
        );
    }

    #[test]
    fn test_float_round_trips_as_bits() {
        let v = Value::F64(-0.5);
        let w = v.to_slot_word().unwrap();
        assert_eq!(Value::from_slot_word(Carrier::F64, w), Some(v));

        let v = Value::F32(1.5);
        let w = v.to_slot_word().unwrap();
        assert_eq!(Value::from_slot_word(Carrier::F32, w), Some(v));
        // upper half of the slot stays clear for f32
        assert_eq!(w >> 32, 0);
    }

    #[test]
    fn test_struct_has_no_slot_word() {
        assert_eq!(Value::Struct(vec![0; 8]).to_slot_word(), None);
        assert_eq!(Value::from_slot_word(Carrier::Struct, 0), None);
    }

    #[test]
    fn test_carrier_layout_compatibility() {
        let i32_layout = Layout::int(4).unwrap();
        let f64_layout = Layout::float(8).unwrap();
        let ptr_layout = Layout::pointer();
        let group = Layout::struct_of(vec![Layout::int(8).unwrap()]).unwrap();

        assert!(Carrier::I32.is_compatible_with(&i32_layout));
        assert!(!Carrier::I64.is_compatible_with(&i32_layout));
        assert!(!Carrier::F32.is_compatible_with(&i32_layout));
        assert!(Carrier::F64.is_compatible_with(&f64_layout));
        assert!(Carrier::Ptr.is_compatible_with(&ptr_layout));
        assert!(!Carrier::I64.is_compatible_with(&ptr_layout));
        assert!(Carrier::Struct.is_compatible_with(&group));
        assert!(!Carrier::Struct.is_compatible_with(&i32_layout));
    }
}
