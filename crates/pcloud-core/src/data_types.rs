/// Numeric encoding of one point field inside a raw point buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float32,
    Float64,
    Float3_32,
    Float3_64,
}

impl Encoding {
    pub const ALL: [Encoding; 12] = [
        Encoding::Int8,
        Encoding::UInt8,
        Encoding::Int16,
        Encoding::UInt16,
        Encoding::Int32,
        Encoding::UInt32,
        Encoding::Int64,
        Encoding::UInt64,
        Encoding::Float32,
        Encoding::Float64,
        Encoding::Float3_32,
        Encoding::Float3_64,
    ];

    pub fn byte_length(&self) -> usize {
        match self {
            Encoding::Int8 | Encoding::UInt8 => 1,
            Encoding::Int16 | Encoding::UInt16 => 2,
            Encoding::Int32 | Encoding::UInt32 | Encoding::Float32 => 4,
            Encoding::Int64 | Encoding::UInt64 | Encoding::Float64 => 8,
            Encoding::Float3_32 => 12,
            Encoding::Float3_64 => 24,
        }
    }

    /// True for the three-component vector encodings.
    pub fn is_vector(&self) -> bool {
        matches!(self, Encoding::Float3_32 | Encoding::Float3_64)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Encoding::Int8 => "Int8",
            Encoding::UInt8 => "UInt8",
            Encoding::Int16 => "Int16",
            Encoding::UInt16 => "UInt16",
            Encoding::Int32 => "Int32",
            Encoding::UInt32 => "UInt32",
            Encoding::Int64 => "Int64",
            Encoding::UInt64 => "UInt64",
            Encoding::Float32 => "Float32",
            Encoding::Float64 => "Float64",
            Encoding::Float3_32 => "Float3_32",
            Encoding::Float3_64 => "Float3_64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|e| e.name() == name)
    }
}

impl std::fmt::Display for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
