//! NaN-boxed reference encoding for the host boundary
//!
//! Every value that crosses between the module and the host is a single
//! 64-bit word. The encoding reuses IEEE 754's quiet NaN space:
//! - Numbers: the literal f64 bit pattern (fast path, no table lookup)
//! - Tagged values: `0x7FF8_000F_xxxx_xxxx` where `F` is a 3-bit type flag
//!   and the low 32 bits index the host's value table
//!
//! Layout of a tagged reference:
//! - bits 63-35: quiet NaN head (`0x7FF8_0000` in the upper word)
//! - bits 34-32: type flag (none/object/string/symbol/function)
//! - bits 31-0:  host table index
//!
//! Raw `0` is `undefined`. Because `+0.0` would otherwise share that bit
//! pattern, zero is carried as a reserved index instead, and so is NaN so
//! that a real NaN can never be mistaken for a tagged reference.

/// Upper 32 bits present on every tagged (non-number) reference.
pub const NAN_HEAD: u32 = 0x7FF8_0000;

/// Mask for the type flag inside the upper word.
const FLAG_MASK: u64 = 0x7;

/// Mask for the table index (bits 0-31).
const INDEX_MASK: u64 = 0x0000_0000_FFFF_FFFF;

/// Reserved indices. Everything up to and including `INDEX_GLOBAL` is a
/// process-wide singleton with no lifetime semantics.
pub const INDEX_NAN: u32 = 0;
pub const INDEX_ZERO: u32 = 1;
pub const INDEX_NULL: u32 = 2;
pub const INDEX_TRUE: u32 = 3;
pub const INDEX_FALSE: u32 = 4;
pub const INDEX_GLOBAL: u32 = 5;

/// First index the host may hand out for its own entries.
pub const FIRST_HOST_INDEX: u32 = INDEX_GLOBAL + 1;

/// The 3-bit discriminator of a tagged reference.
///
/// These values are shared with the host side and must never change.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TypeFlag {
    None = 0,
    Object = 1,
    String = 2,
    Symbol = 3,
    Function = 4,
}

impl TypeFlag {
    /// Decode the 3-bit field. Values 5..=7 have no meaning.
    #[inline]
    pub const fn from_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(Self::None),
            1 => Some(Self::Object),
            2 => Some(Self::String),
            3 => Some(Self::Symbol),
            4 => Some(Self::Function),
            _ => None,
        }
    }
}

/// Result of taking a reference apart.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Decoded {
    /// A plain number (including the reserved zero and NaN).
    Number(f64),
    /// A tagged reference. `flag` is the raw 3-bit field so that corrupt
    /// discriminators remain observable.
    Tagged { flag: u8, index: u32 },
}

/// An opaque 64-bit handle: either a number or a tagged host table index.
///
/// Designed to be:
/// - Passed across the boundary as a single u64
/// - Cheaply copied (Copy trait)
/// - Compared by identity (bit equality)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Reference {
    bits: u64,
}

impl Reference {
    pub const UNDEFINED: Self = Self::from_bits(0);
    pub const NAN: Self = Self::predefined(INDEX_NAN, TypeFlag::None);
    pub const ZERO: Self = Self::predefined(INDEX_ZERO, TypeFlag::None);
    pub const NULL: Self = Self::predefined(INDEX_NULL, TypeFlag::None);
    pub const TRUE: Self = Self::predefined(INDEX_TRUE, TypeFlag::None);
    pub const FALSE: Self = Self::predefined(INDEX_FALSE, TypeFlag::None);
    pub const GLOBAL: Self = Self::predefined(INDEX_GLOBAL, TypeFlag::Object);

    // =========================================================================
    // Constructors
    // =========================================================================

    /// Build a tagged reference from an index and a type flag.
    #[inline]
    pub const fn predefined(index: u32, flag: TypeFlag) -> Self {
        Self {
            bits: (((NAN_HEAD | flag as u32) as u64) << 32) | index as u64,
        }
    }

    /// Encode a number.
    ///
    /// `+0.0` and every NaN map to their reserved references; all other
    /// doubles (including `-0.0`) keep their exact bit pattern.
    #[inline]
    pub fn number(n: f64) -> Self {
        if n.is_nan() {
            return Self::NAN;
        }
        let bits = n.to_bits();
        if bits == 0 {
            return Self::ZERO;
        }
        Self { bits }
    }

    /// Encode a boolean.
    #[inline]
    pub const fn boolean(b: bool) -> Self {
        if b { Self::TRUE } else { Self::FALSE }
    }

    /// Create from raw bits (as received from the host).
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self { bits }
    }

    /// Get the raw bits (as sent to the host).
    #[inline]
    pub const fn to_bits(self) -> u64 {
        self.bits
    }

    // =========================================================================
    // Type Checking
    // =========================================================================

    /// Check if this reference carries a number.
    #[inline]
    pub fn is_number(self) -> bool {
        self == Self::ZERO
            || self == Self::NAN
            || (self != Self::UNDEFINED && (self.high() & NAN_HEAD) != NAN_HEAD)
    }

    /// Check if this is one of the process-wide predefined references.
    #[inline]
    pub fn is_reserved(self) -> bool {
        self == Self::UNDEFINED
            || self == Self::NAN
            || self == Self::ZERO
            || self == Self::NULL
            || self == Self::TRUE
            || self == Self::FALSE
            || self == Self::GLOBAL
    }

    /// Check if a value built from this reference needs a lifetime tracker,
    /// i.e. it names a host table slot the module must eventually release.
    #[inline]
    pub fn is_tracked(self) -> bool {
        !self.is_number() && !self.is_reserved()
    }

    // =========================================================================
    // Value Extraction
    // =========================================================================

    /// Get the number, or None if this is a tagged reference.
    #[inline]
    pub fn as_number(self) -> Option<f64> {
        if self == Self::ZERO {
            Some(0.0)
        } else if self == Self::NAN {
            Some(f64::NAN)
        } else if self.is_number() {
            Some(f64::from_bits(self.bits))
        } else {
            None
        }
    }

    /// The raw 3-bit type flag field.
    #[inline]
    pub const fn flag_bits(self) -> u8 {
        ((self.bits >> 32) & FLAG_MASK) as u8
    }

    /// The type flag, or None for an undefined discriminator.
    #[inline]
    pub const fn flag(self) -> Option<TypeFlag> {
        TypeFlag::from_bits(self.flag_bits())
    }

    /// The host table index (low 32 bits).
    #[inline]
    pub const fn index(self) -> u32 {
        (self.bits & INDEX_MASK) as u32
    }

    /// Take the reference apart.
    #[inline]
    pub fn decode(self) -> Decoded {
        match self.as_number() {
            Some(n) => Decoded::Number(n),
            None => Decoded::Tagged {
                flag: self.flag_bits(),
                index: self.index(),
            },
        }
    }

    #[inline]
    const fn high(self) -> u32 {
        (self.bits >> 32) as u32
    }
}

impl std::fmt::Debug for Reference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            Self::UNDEFINED => write!(f, "Undefined"),
            Self::NULL => write!(f, "Null"),
            Self::TRUE => write!(f, "Boolean(true)"),
            Self::FALSE => write!(f, "Boolean(false)"),
            Self::GLOBAL => write!(f, "Global"),
            _ => match self.decode() {
                Decoded::Number(n) => write!(f, "Number({})", n),
                Decoded::Tagged { flag, index } => match TypeFlag::from_bits(flag) {
                    Some(flag) => write!(f, "{:?}#{}", flag, index),
                    None => write!(f, "Unknown(0x{:016x})", self.bits),
                },
            },
        }
    }
}

impl Default for Reference {
    fn default() -> Self {
        Self::UNDEFINED
    }
}
