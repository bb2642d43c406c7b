//! Glow message model and its BER codec.

mod decode;
mod element;
mod encode;
mod path;
mod types;

pub use element::{Address, Command, Element, ElementKind, Fragment, MatrixBody, Root};
pub use path::{PathParseError, TreePath};
pub use types::{
    Access, AddressingMode, CommandKind, ConnectionDisposition, ConnectionOperation,
    FunctionContents, Invocation, InvocationResult, Label, MatrixConnection, MatrixContents,
    MatrixType, NodeContents, ParameterContents, ParameterType, ParametersLocation,
    StreamDescriptor, StreamEntry, StringIntegerPair, TupleItem, Value,
};

use crate::ber::DecodeError;

/// Application tag numbers of the Glow DTD.
pub(crate) mod tags {
    pub const ROOT: u32 = 0;
    pub const PARAMETER: u32 = 1;
    pub const COMMAND: u32 = 2;
    pub const NODE: u32 = 3;
    pub const ELEMENT_COLLECTION: u32 = 4;
    pub const STREAM_ENTRY: u32 = 5;
    pub const STREAM_COLLECTION: u32 = 6;
    pub const STRING_INTEGER_PAIR: u32 = 7;
    pub const STRING_INTEGER_COLLECTION: u32 = 8;
    pub const QUALIFIED_PARAMETER: u32 = 9;
    pub const QUALIFIED_NODE: u32 = 10;
    pub const ROOT_ELEMENT_COLLECTION: u32 = 11;
    pub const STREAM_DESCRIPTION: u32 = 12;
    pub const MATRIX: u32 = 13;
    pub const TARGET: u32 = 14;
    pub const SOURCE: u32 = 15;
    pub const CONNECTION: u32 = 16;
    pub const QUALIFIED_MATRIX: u32 = 17;
    pub const LABEL: u32 = 18;
    pub const FUNCTION: u32 = 19;
    pub const QUALIFIED_FUNCTION: u32 = 20;
    pub const TUPLE_ITEM_DESCRIPTION: u32 = 21;
    pub const INVOCATION: u32 = 22;
    pub const INVOCATION_RESULT: u32 = 23;
}

impl Root {
    pub fn encode(&self) -> Vec<u8> {
        encode::encode(self)
    }

    /// Decodes one complete message. Unknown tags are errors, never skipped.
    pub fn decode(data: &[u8]) -> Result<Root, DecodeError> {
        decode::decode(data)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::ber::{BerWriter, MAX_NESTING, Tag};

    fn round_trip(root: &Root) -> Root {
        Root::decode(&root.encode()).unwrap()
    }

    #[test]
    fn test_get_directory_request() {
        let request = Root::single(Element::node(1, None).with_children(vec![
            Element::node(2, None)
                .with_children(vec![Command::get_directory().into()])
                .into(),
        ]));
        assert_eq!(round_trip(&request), request);
    }

    #[test]
    fn test_parameter_contents() {
        let contents = ParameterContents {
            identifier: Some("gain".into()),
            value: Some(Value::Real(-6.5)),
            minimum: Some(Value::Integer(-128)),
            maximum: Some(Value::Integer(15)),
            access: Some(Access::READ_WRITE),
            kind: Some(ParameterType::Real),
            enum_map: Some(vec![StringIntegerPair {
                name: "off".into(),
                value: 0,
            }]),
            stream_descriptor: Some(StreamDescriptor {
                format: 4,
                offset: 8,
            }),
            stream_identifier: Some(12),
            template_reference: Some(TreePath::new(vec![9, 1])),
            ..Default::default()
        };
        let root = Root::single(Element::new(
            Address::Path(TreePath::new(vec![0, 3, 1])),
            ElementKind::Parameter(Some(contents)),
        ));
        assert_eq!(round_trip(&root), root);
    }

    #[test]
    fn test_matrix_with_connections() {
        let mut connections = BTreeMap::new();
        connections.insert(
            2,
            MatrixConnection {
                target: 2,
                sources: vec![1, 5],
                operation: Some(ConnectionOperation::Connect),
                disposition: Some(ConnectionDisposition::Modified),
            },
        );
        let body = MatrixBody {
            contents: Some(MatrixContents {
                identifier: Some("router".into()),
                kind: Some(MatrixType::NToN),
                mode: Some(AddressingMode::NonLinear),
                target_count: Some(4),
                source_count: Some(8),
                parameters_location: Some(ParametersLocation::BasePath(TreePath::new(vec![1, 2]))),
                labels: Some(vec![Label {
                    base_path: TreePath::new(vec![1, 3]),
                    description: "primary".into(),
                }]),
                ..Default::default()
            }),
            targets: Some(vec![0, 2]),
            sources: Some(vec![1, 5]),
            connections: Some(connections),
        };
        let root = Root::single(Element::matrix(7, body));
        assert_eq!(round_trip(&root), root);
    }

    #[test]
    fn test_function_and_invocation() {
        let function = Element::function(
            4,
            Some(FunctionContents {
                identifier: Some("add".into()),
                arguments: Some(vec![
                    TupleItem {
                        kind: ParameterType::Integer,
                        name: Some("a".into()),
                    },
                    TupleItem {
                        kind: ParameterType::Integer,
                        name: None,
                    },
                ]),
                ..Default::default()
            }),
        )
        .with_children(vec![
            Command::invoke(Invocation {
                id: Some(3),
                arguments: vec![Value::Integer(1), Value::String("two".into())],
            })
            .into(),
        ]);
        let root = Root::single(function);
        assert_eq!(round_trip(&root), root);
    }

    #[test]
    fn test_invocation_result_and_streams() {
        let result = Root::InvocationResult(InvocationResult::success(
            9,
            vec![Value::Boolean(true), Value::Null],
        ));
        assert_eq!(round_trip(&result), result);

        let streams = Root::Streams(vec![StreamEntry {
            identifier: 5,
            value: Value::Octets(vec![1, 2, 3]),
        }]);
        assert_eq!(round_trip(&streams), streams);
    }

    #[test]
    fn test_empty_root() {
        let mut w = BerWriter::new();
        w.sequence(Tag::application(tags::ROOT), |_| {});
        assert_eq!(Root::decode(&w.into_bytes()).unwrap(), Root::default());
    }

    #[test]
    fn test_unknown_tag_is_an_error() {
        let mut w = BerWriter::new();
        w.sequence(Tag::application(tags::ROOT), |w| {
            w.sequence(Tag::application(tags::ROOT_ELEMENT_COLLECTION), |w| {
                w.context(0, |w| {
                    w.sequence(Tag::application(30), |w| {
                        w.context(0, |w| w.write_integer(1));
                    });
                });
            });
        });
        let err = Root::decode(&w.into_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::UnimplementedType(Tag::application(30)));
    }

    #[test]
    fn test_unknown_content_field_is_an_error() {
        let mut w = BerWriter::new();
        w.sequence(Tag::application(tags::ROOT), |w| {
            w.sequence(Tag::application(tags::ROOT_ELEMENT_COLLECTION), |w| {
                w.context(0, |w| {
                    w.sequence(Tag::application(tags::NODE), |w| {
                        w.context(0, |w| w.write_integer(1));
                        w.context(1, |w| {
                            w.sequence(Tag::SET, |w| {
                                w.context(42, |w| w.write_utf8("x"));
                            });
                        });
                    });
                });
            });
        });
        let err = Root::decode(&w.into_bytes()).unwrap_err();
        assert_eq!(err, DecodeError::UnimplementedType(Tag::context(42)));
    }

    #[test]
    fn test_missing_number_is_an_error() {
        let mut w = BerWriter::new();
        w.sequence(Tag::application(tags::ROOT), |w| {
            w.sequence(Tag::application(tags::ROOT_ELEMENT_COLLECTION), |w| {
                w.context(0, |w| {
                    w.sequence(Tag::application(tags::PARAMETER), |_| {});
                });
            });
        });
        let err = Root::decode(&w.into_bytes()).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField(_)));
    }

    fn node_chain(levels: usize) -> Root {
        let mut element = Element::node(0, None);
        for _ in 1..levels {
            element = Element::node(0, None).with_children(vec![element.into()]);
        }
        Root::single(element)
    }

    #[test]
    fn test_element_nesting_is_bounded() {
        let deepest = node_chain(MAX_NESTING);
        assert_eq!(round_trip(&deepest), deepest);

        let err = Root::decode(&node_chain(MAX_NESTING + 1).encode()).unwrap_err();
        assert_eq!(err, DecodeError::TooDeep(MAX_NESTING));
    }

    #[test]
    fn test_deep_indefinite_frame_is_an_error() {
        let levels = 200_000;
        let mut bytes = vec![0x60, 0x80];
        for _ in 0..levels {
            bytes.extend_from_slice(&[0xA0, 0x80]);
        }
        bytes.resize(bytes.len() + 2 * (levels + 1), 0x00);

        let handle = std::thread::Builder::new()
            .stack_size(256 * 1024)
            .spawn(move || Root::decode(&bytes))
            .unwrap();
        assert_eq!(
            handle.join().unwrap(),
            Err(DecodeError::TooDeep(MAX_NESTING))
        );
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = Root::default().encode();
        bytes.push(0);
        assert!(matches!(
            Root::decode(&bytes),
            Err(DecodeError::TrailingData(1))
        ));
    }
}
