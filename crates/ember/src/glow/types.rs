use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use super::path::TreePath;

static NEXT_INVOCATION_ID: AtomicU32 = AtomicU32::new(1);

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    String(String),
    Boolean(bool),
    Octets(Vec<u8>),
    Null,
}

impl Value {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_real(&self) -> Option<f64> {
        match self {
            Value::Real(v) => Some(*v),
            Value::Integer(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Real(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{:?}", v),
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Octets(v) => write!(f, "<{} bytes>", v.len()),
            Value::Null => f.write_str("null"),
        }
    }
}

bitflags! {
    /// Parameter access rights. The wire code is the raw bit value:
    /// none 0, read 1, write 2, read-write 3.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Access: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const READ_WRITE = Self::READ.bits() | Self::WRITE.bits();
    }
}

impl Access {
    pub fn from_code(code: i64) -> Option<Self> {
        u8::try_from(code).ok().and_then(Self::from_bits)
    }

    pub fn code(self) -> i64 {
        i64::from(self.bits())
    }

    #[inline]
    pub fn can_write(self) -> bool {
        self.contains(Access::WRITE)
    }
}

macro_rules! wire_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident = $code:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn from_code(code: i64) -> Option<Self> {
                match code {
                    $($code => Some(Self::$variant),)+
                    _ => None,
                }
            }

            pub fn code(self) -> i64 {
                match self {
                    $(Self::$variant => $code),+
                }
            }
        }
    };
}

wire_enum!(
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    ParameterType {
        Null = 0,
        Integer = 1,
        Real = 2,
        String = 3,
        Boolean = 4,
        Trigger = 5,
        Enum = 6,
        Octets = 7,
    }
);

wire_enum!(
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    MatrixType {
        OneToN = 0,
        OneToOne = 1,
        NToN = 2,
    }
);

wire_enum!(
    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    AddressingMode {
        Linear = 0,
        NonLinear = 1,
    }
);

wire_enum!(ConnectionOperation {
    Absolute = 0,
    Connect = 1,
    Disconnect = 2,
});

wire_enum!(
    /// `Tally` is the confirmed state of a connection.
    ConnectionDisposition {
        Tally = 0,
        Modified = 1,
        Pending = 2,
        Locked = 3,
    }
);

impl Default for MatrixType {
    fn default() -> Self {
        MatrixType::OneToN
    }
}

impl Default for AddressingMode {
    fn default() -> Self {
        AddressingMode::Linear
    }
}

impl Default for ConnectionOperation {
    fn default() -> Self {
        ConnectionOperation::Absolute
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Subscribe,
    Unsubscribe,
    GetDirectory,
    Invoke,
    Other(u32),
}

impl CommandKind {
    pub fn from_number(number: u32) -> Self {
        match number {
            30 => CommandKind::Subscribe,
            31 => CommandKind::Unsubscribe,
            32 => CommandKind::GetDirectory,
            33 => CommandKind::Invoke,
            other => CommandKind::Other(other),
        }
    }

    pub fn number(self) -> u32 {
        match self {
            CommandKind::Subscribe => 30,
            CommandKind::Unsubscribe => 31,
            CommandKind::GetDirectory => 32,
            CommandKind::Invoke => 33,
            CommandKind::Other(n) => n,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringIntegerPair {
    pub name: String,
    pub value: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescriptor {
    pub format: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleItem {
    pub kind: ParameterType,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub base_path: TreePath,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParametersLocation {
    BasePath(TreePath),
    Inline(u32),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeContents {
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub is_root: Option<bool>,
    pub is_online: Option<bool>,
    pub schema_identifiers: Option<String>,
    pub template_reference: Option<TreePath>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParameterContents {
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub value: Option<Value>,
    pub minimum: Option<Value>,
    pub maximum: Option<Value>,
    pub access: Option<Access>,
    pub format: Option<String>,
    pub enumeration: Option<String>,
    pub factor: Option<i64>,
    pub is_online: Option<bool>,
    pub formula: Option<String>,
    pub step: Option<i64>,
    pub default: Option<Value>,
    pub kind: Option<ParameterType>,
    pub stream_identifier: Option<i64>,
    pub enum_map: Option<Vec<StringIntegerPair>>,
    pub stream_descriptor: Option<StreamDescriptor>,
    pub schema_identifiers: Option<String>,
    pub template_reference: Option<TreePath>,
}

impl ParameterContents {
    /// Parameters without an explicit access field are read-only.
    pub fn effective_access(&self) -> Access {
        self.access.unwrap_or(Access::READ)
    }

    pub fn is_stream(&self) -> bool {
        self.stream_identifier.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixContents {
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub kind: Option<MatrixType>,
    pub mode: Option<AddressingMode>,
    pub target_count: Option<u32>,
    pub source_count: Option<u32>,
    pub maximum_total_connects: Option<u32>,
    pub maximum_connects_per_target: Option<u32>,
    pub parameters_location: Option<ParametersLocation>,
    pub gain_parameter_number: Option<u32>,
    pub labels: Option<Vec<Label>>,
    pub schema_identifiers: Option<String>,
    pub template_reference: Option<TreePath>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FunctionContents {
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub arguments: Option<Vec<TupleItem>>,
    pub result: Option<Vec<TupleItem>>,
    pub template_reference: Option<TreePath>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixConnection {
    pub target: u32,
    pub sources: Vec<u32>,
    pub operation: Option<ConnectionOperation>,
    pub disposition: Option<ConnectionDisposition>,
}

impl MatrixConnection {
    pub fn new(target: u32, sources: Vec<u32>) -> Self {
        Self {
            target,
            sources,
            operation: None,
            disposition: None,
        }
    }

    pub fn with_operation(mut self, operation: ConnectionOperation) -> Self {
        self.operation = Some(operation);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub id: Option<u32>,
    pub arguments: Vec<Value>,
}

impl Invocation {
    /// Creates an invocation carrying the next process-wide invocation id.
    pub fn new(arguments: Vec<Value>) -> Self {
        Self {
            id: Some(NEXT_INVOCATION_ID.fetch_add(1, Ordering::Relaxed)),
            arguments,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InvocationResult {
    pub id: u32,
    pub success: bool,
    pub result: Vec<Value>,
}

impl InvocationResult {
    pub fn success(id: u32, result: Vec<Value>) -> Self {
        Self {
            id,
            success: true,
            result,
        }
    }

    pub fn failure(id: u32) -> Self {
        Self {
            id,
            success: false,
            result: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StreamEntry {
    pub identifier: i64,
    pub value: Value,
}
