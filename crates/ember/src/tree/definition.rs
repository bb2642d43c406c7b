use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::Tree;
use crate::error::Error;
use crate::glow::{
    Access, AddressingMode, Element, FunctionContents, Label, MatrixBody, MatrixConnection,
    MatrixContents, MatrixType, NodeContents, ParameterContents, ParameterType, StringIntegerPair,
    TupleItem, Value,
};

/// One entry of a JSON tree definition. Entries without a `number` take
/// their index among their siblings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeDefinition {
    #[serde(rename_all = "camelCase")]
    Node {
        #[serde(default)]
        number: Option<u32>,
        identifier: Option<String>,
        description: Option<String>,
        #[serde(default)]
        is_online: Option<bool>,
        #[serde(default)]
        children: Vec<NodeDefinition>,
    },
    Parameter(ParameterDefinition),
    Matrix(MatrixDefinition),
    Function(FunctionDefinition),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDefinition {
    Boolean(bool),
    Integer(i64),
    Real(f64),
    String(String),
    Null,
}

impl From<ValueDefinition> for Value {
    fn from(value: ValueDefinition) -> Self {
        match value {
            ValueDefinition::Boolean(v) => Value::Boolean(v),
            ValueDefinition::Integer(v) => Value::Integer(v),
            ValueDefinition::Real(v) => Value::Real(v),
            ValueDefinition::String(v) => Value::String(v),
            ValueDefinition::Null => Value::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessDefinition {
    None,
    Read,
    Write,
    ReadWrite,
}

impl From<AccessDefinition> for Access {
    fn from(access: AccessDefinition) -> Self {
        match access {
            AccessDefinition::None => Access::empty(),
            AccessDefinition::Read => Access::READ,
            AccessDefinition::Write => Access::WRITE,
            AccessDefinition::ReadWrite => Access::READ_WRITE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ParameterDefinition {
    pub number: Option<u32>,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub value: Option<ValueDefinition>,
    #[serde(alias = "min")]
    pub minimum: Option<ValueDefinition>,
    #[serde(alias = "max")]
    pub maximum: Option<ValueDefinition>,
    pub access: Option<AccessDefinition>,
    #[serde(rename = "type")]
    pub parameter_type: Option<ParameterType>,
    pub format: Option<String>,
    pub enumeration: Option<String>,
    pub enum_map: Option<BTreeMap<String, i64>>,
    pub factor: Option<i64>,
    pub formula: Option<String>,
    pub step: Option<i64>,
    pub default: Option<ValueDefinition>,
    pub stream_identifier: Option<i64>,
    pub is_online: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDefinition {
    pub target: u32,
    #[serde(default)]
    pub sources: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelDefinition {
    pub base_path: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MatrixDefinition {
    pub number: Option<u32>,
    pub identifier: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub matrix_type: Option<MatrixType>,
    pub mode: Option<AddressingMode>,
    pub target_count: Option<u32>,
    pub source_count: Option<u32>,
    pub maximum_total_connects: Option<u32>,
    pub maximum_connects_per_target: Option<u32>,
    pub targets: Option<Vec<u32>>,
    pub sources: Option<Vec<u32>>,
    pub connections: Vec<ConnectionDefinition>,
    pub labels: Vec<LabelDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleDefinition {
    #[serde(rename = "type")]
    pub item_type: ParameterType,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FunctionDefinition {
    pub number: Option<u32>,
    pub identifier: Option<String>,
    pub description: Option<String>,
    pub arguments: Vec<TupleDefinition>,
    pub result: Vec<TupleDefinition>,
}

impl NodeDefinition {
    /// Converts the definition into a hierarchical element, using
    /// `index` when no number is given.
    pub fn to_element(&self, index: u32) -> Result<Element, Error> {
        let element = match self {
            NodeDefinition::Node {
                number,
                identifier,
                description,
                is_online,
                children,
            } => {
                let contents = NodeContents {
                    identifier: identifier.clone(),
                    description: description.clone(),
                    is_online: *is_online,
                    ..Default::default()
                };
                let children = children
                    .iter()
                    .zip(0u32..)
                    .map(|(child, i)| child.to_element(i).map(Into::into))
                    .collect::<Result<Vec<_>, _>>()?;
                let element = Element::node(number.unwrap_or(index), Some(contents));
                if children.is_empty() {
                    element
                } else {
                    element.with_children(children)
                }
            }
            NodeDefinition::Parameter(p) => {
                Element::parameter(p.number.unwrap_or(index), Some(p.contents()))
            }
            NodeDefinition::Matrix(m) => Element::matrix(m.number.unwrap_or(index), m.body()?),
            NodeDefinition::Function(f) => {
                Element::function(f.number.unwrap_or(index), Some(f.contents()))
            }
        };
        Ok(element)
    }
}

impl ParameterDefinition {
    fn contents(&self) -> ParameterContents {
        let enum_map = self.enum_map.as_ref().map(|map| {
            let mut entries: Vec<StringIntegerPair> = map
                .iter()
                .map(|(name, value)| StringIntegerPair {
                    name: name.clone(),
                    value: *value,
                })
                .collect();
            entries.sort_by_key(|entry| entry.value);
            entries
        });
        ParameterContents {
            identifier: self.identifier.clone(),
            description: self.description.clone(),
            value: self.value.clone().map(Value::from),
            minimum: self.minimum.clone().map(Value::from),
            maximum: self.maximum.clone().map(Value::from),
            access: self.access.map(Access::from),
            format: self.format.clone(),
            enumeration: self.enumeration.clone(),
            factor: self.factor,
            is_online: self.is_online,
            formula: self.formula.clone(),
            step: self.step,
            default: self.default.clone().map(Value::from),
            kind: self.parameter_type.or(enum_map.as_ref().map(|_| ParameterType::Enum)),
            stream_identifier: self.stream_identifier,
            enum_map,
            ..Default::default()
        }
    }
}

impl MatrixDefinition {
    fn body(&self) -> Result<MatrixBody, Error> {
        let labels = self
            .labels
            .iter()
            .map(|label| -> Result<Label, Error> {
                Ok(Label {
                    base_path: label.base_path.parse()?,
                    description: label.description.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let contents = MatrixContents {
            identifier: self.identifier.clone(),
            description: self.description.clone(),
            kind: Some(self.matrix_type.unwrap_or_default()),
            mode: Some(self.mode.unwrap_or_default()),
            target_count: self.target_count.or(self.targets.as_ref().map(|t| t.len() as u32)),
            source_count: self.source_count.or(self.sources.as_ref().map(|s| s.len() as u32)),
            maximum_total_connects: self.maximum_total_connects,
            maximum_connects_per_target: self.maximum_connects_per_target,
            labels: (!labels.is_empty()).then_some(labels),
            ..Default::default()
        };

        let target_numbers: Vec<u32> = match &self.targets {
            Some(targets) => targets.clone(),
            None => (0..contents.target_count.unwrap_or(0)).collect(),
        };
        let mut connections: BTreeMap<u32, MatrixConnection> = target_numbers
            .iter()
            .map(|&target| (target, MatrixConnection::new(target, Vec::new())))
            .collect();
        for definition in &self.connections {
            let mut sources = definition.sources.clone();
            sources.sort_unstable();
            sources.dedup();
            connections.insert(
                definition.target,
                MatrixConnection::new(definition.target, sources),
            );
        }

        Ok(MatrixBody {
            contents: Some(contents),
            targets: self.targets.clone(),
            sources: self.sources.clone(),
            connections: Some(connections),
        })
    }
}

impl FunctionDefinition {
    fn contents(&self) -> FunctionContents {
        let tuple = |items: &[TupleDefinition]| {
            items
                .iter()
                .map(|item| TupleItem {
                    kind: item.item_type,
                    name: item.name.clone(),
                })
                .collect::<Vec<_>>()
        };
        FunctionContents {
            identifier: self.identifier.clone(),
            description: self.description.clone(),
            arguments: Some(tuple(&self.arguments)),
            result: Some(tuple(&self.result)),
            ..Default::default()
        }
    }
}

impl Tree {
    pub fn from_definitions(definitions: &[NodeDefinition]) -> Result<Self, Error> {
        let elements = definitions
            .iter()
            .zip(0u32..)
            .map(|(definition, i)| definition.to_element(i))
            .collect::<Result<Vec<_>, _>>()?;
        Tree::from_elements(elements)
    }

    /// Parses a JSON array of node definitions.
    pub fn from_definition(json: &str) -> Result<Self, Error> {
        let definitions: Vec<NodeDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(&definitions)
    }
}
