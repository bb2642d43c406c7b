use std::collections::BTreeMap;

use super::path::TreePath;
use super::types::{
    CommandKind, FunctionContents, Invocation, InvocationResult, MatrixConnection, MatrixContents,
    NodeContents, ParameterContents, StreamEntry,
};

/// How an element is addressed on the wire: by its number under the
/// enclosing element, or by an absolute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Address {
    Number(u32),
    Path(TreePath),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixBody {
    pub contents: Option<MatrixContents>,
    pub targets: Option<Vec<u32>>,
    pub sources: Option<Vec<u32>>,
    pub connections: Option<BTreeMap<u32, MatrixConnection>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElementKind {
    Node(Option<NodeContents>),
    Parameter(Option<ParameterContents>),
    Function(Option<FunctionContents>),
    Matrix(Box<MatrixBody>),
}

impl ElementKind {
    pub fn has_contents(&self) -> bool {
        match self {
            ElementKind::Node(c) => c.is_some(),
            ElementKind::Parameter(c) => c.is_some(),
            ElementKind::Function(c) => c.is_some(),
            ElementKind::Matrix(m) => m.contents.is_some(),
        }
    }

    /// Same variant, no contents.
    pub fn stripped(&self) -> Self {
        match self {
            ElementKind::Node(_) => ElementKind::Node(None),
            ElementKind::Parameter(_) => ElementKind::Parameter(None),
            ElementKind::Function(_) => ElementKind::Function(None),
            ElementKind::Matrix(_) => ElementKind::Matrix(Box::default()),
        }
    }

    /// Same variant and contents, without matrix routing state.
    pub fn contents_only(&self) -> Self {
        match self {
            ElementKind::Matrix(m) => ElementKind::Matrix(Box::new(MatrixBody {
                contents: m.contents.clone(),
                ..MatrixBody::default()
            })),
            other => other.clone(),
        }
    }

    /// Parameters with a stream identifier push their values through
    /// stream collections rather than tree updates.
    pub fn is_stream(&self) -> bool {
        matches!(self, ElementKind::Parameter(Some(c)) if c.is_stream())
    }

    pub fn parameter_contents(&self) -> Option<&ParameterContents> {
        match self {
            ElementKind::Parameter(c) => c.as_ref(),
            _ => None,
        }
    }

    pub fn matrix(&self) -> Option<&MatrixBody> {
        match self {
            ElementKind::Matrix(m) => Some(&**m),
            _ => None,
        }
    }

    pub fn matrix_mut(&mut self) -> Option<&mut MatrixBody> {
        match self {
            ElementKind::Matrix(m) => Some(&mut **m),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub address: Address,
    pub kind: ElementKind,
    pub children: Option<Vec<Fragment>>,
}

impl Element {
    pub fn new(address: Address, kind: ElementKind) -> Self {
        Self {
            address,
            kind,
            children: None,
        }
    }

    pub fn node(number: u32, contents: Option<NodeContents>) -> Self {
        Self::new(Address::Number(number), ElementKind::Node(contents))
    }

    pub fn parameter(number: u32, contents: Option<ParameterContents>) -> Self {
        Self::new(Address::Number(number), ElementKind::Parameter(contents))
    }

    pub fn function(number: u32, contents: Option<FunctionContents>) -> Self {
        Self::new(Address::Number(number), ElementKind::Function(contents))
    }

    pub fn matrix(number: u32, body: MatrixBody) -> Self {
        Self::new(Address::Number(number), ElementKind::Matrix(Box::new(body)))
    }

    pub fn with_children(mut self, children: Vec<Fragment>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn add_child(&mut self, child: impl Into<Fragment>) {
        self.children.get_or_insert_with(Vec::new).push(child.into());
    }

    pub fn number(&self) -> Option<u32> {
        match self.address {
            Address::Number(n) => Some(n),
            Address::Path(_) => None,
        }
    }

    pub fn path(&self) -> Option<&TreePath> {
        match &self.address {
            Address::Path(p) => Some(p),
            Address::Number(_) => None,
        }
    }

    pub fn is_qualified(&self) -> bool {
        matches!(self.address, Address::Path(_))
    }

    pub fn is_node(&self) -> bool {
        matches!(self.kind, ElementKind::Node(_))
    }

    pub fn is_parameter(&self) -> bool {
        matches!(self.kind, ElementKind::Parameter(_))
    }

    pub fn is_function(&self) -> bool {
        matches!(self.kind, ElementKind::Function(_))
    }

    pub fn is_matrix(&self) -> bool {
        matches!(self.kind, ElementKind::Matrix(_))
    }

    pub fn children(&self) -> &[Fragment] {
        self.children.as_deref().unwrap_or(&[])
    }

    /// Copy addressed by `path`, without children.
    pub fn to_qualified(&self, path: TreePath) -> Element {
        Element::new(Address::Path(path), self.kind.clone())
    }

    /// Copy addressed by `number`, without children.
    pub fn to_hierarchical(&self, number: u32) -> Element {
        Element::new(Address::Number(number), self.kind.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub kind: CommandKind,
    pub dir_field_mask: Option<i64>,
    pub invocation: Option<Invocation>,
}

impl Command {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            dir_field_mask: None,
            invocation: None,
        }
    }

    pub fn get_directory() -> Self {
        Self::new(CommandKind::GetDirectory)
    }

    pub fn invoke(invocation: Invocation) -> Self {
        Self {
            kind: CommandKind::Invoke,
            dir_field_mask: None,
            invocation: Some(invocation),
        }
    }
}

/// An entry of an element collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Element(Element),
    Command(Command),
}

impl Fragment {
    pub fn is_command(&self) -> bool {
        matches!(self, Fragment::Command(_))
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Fragment::Element(e) => Some(e),
            Fragment::Command(_) => None,
        }
    }

    pub fn as_command(&self) -> Option<&Command> {
        match self {
            Fragment::Command(c) => Some(c),
            Fragment::Element(_) => None,
        }
    }
}

impl From<Element> for Fragment {
    fn from(element: Element) -> Self {
        Fragment::Element(element)
    }
}

impl From<Command> for Fragment {
    fn from(command: Command) -> Self {
        Fragment::Command(command)
    }
}

/// Top level of every Glow message.
#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    Elements(Vec<Fragment>),
    Streams(Vec<StreamEntry>),
    InvocationResult(InvocationResult),
}

impl Default for Root {
    fn default() -> Self {
        Root::Elements(Vec::new())
    }
}

impl Root {
    pub fn new(elements: Vec<Fragment>) -> Self {
        Root::Elements(elements)
    }

    pub fn single(fragment: impl Into<Fragment>) -> Self {
        Root::Elements(vec![fragment.into()])
    }

    pub fn elements(&self) -> &[Fragment] {
        match self {
            Root::Elements(elements) => elements,
            _ => &[],
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Root::Elements(elements) => elements.is_empty(),
            Root::Streams(entries) => entries.is_empty(),
            Root::InvocationResult(_) => false,
        }
    }
}
