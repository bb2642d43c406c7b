use std::collections::BTreeMap;

use crate::ber::{BerWriter, Tag};

use super::element::{Address, Command, Element, ElementKind, Fragment, MatrixBody, Root};
use super::tags;
use super::types::{
    FunctionContents, Invocation, InvocationResult, Label, MatrixConnection, MatrixContents,
    NodeContents, ParameterContents, ParametersLocation, StreamEntry, StringIntegerPair, TupleItem,
    Value,
};

pub fn encode(root: &Root) -> Vec<u8> {
    let mut w = BerWriter::new();
    w.sequence(Tag::application(tags::ROOT), |w| match root {
        Root::Elements(elements) => {
            w.sequence(Tag::application(tags::ROOT_ELEMENT_COLLECTION), |w| {
                for fragment in elements {
                    w.context(0, |w| encode_fragment(w, fragment));
                }
            });
        }
        Root::Streams(entries) => {
            w.sequence(Tag::application(tags::STREAM_COLLECTION), |w| {
                for entry in entries {
                    w.context(0, |w| encode_stream_entry(w, entry));
                }
            });
        }
        Root::InvocationResult(result) => encode_invocation_result(w, result),
    });
    w.into_bytes()
}

fn encode_fragment(w: &mut BerWriter, fragment: &Fragment) {
    match fragment {
        Fragment::Element(element) => encode_element(w, element),
        Fragment::Command(command) => encode_command(w, command),
    }
}

fn element_tag(element: &Element) -> u32 {
    let qualified = element.is_qualified();
    match (&element.kind, qualified) {
        (ElementKind::Node(_), false) => tags::NODE,
        (ElementKind::Node(_), true) => tags::QUALIFIED_NODE,
        (ElementKind::Parameter(_), false) => tags::PARAMETER,
        (ElementKind::Parameter(_), true) => tags::QUALIFIED_PARAMETER,
        (ElementKind::Matrix(_), false) => tags::MATRIX,
        (ElementKind::Matrix(_), true) => tags::QUALIFIED_MATRIX,
        (ElementKind::Function(_), false) => tags::FUNCTION,
        (ElementKind::Function(_), true) => tags::QUALIFIED_FUNCTION,
    }
}

fn encode_element(w: &mut BerWriter, element: &Element) {
    w.sequence(Tag::application(element_tag(element)), |w| {
        w.context(0, |w| match &element.address {
            Address::Number(number) => w.write_integer(i64::from(*number)),
            Address::Path(path) => w.write_relative_oid(path.components()),
        });

        match &element.kind {
            ElementKind::Node(Some(contents)) => {
                w.context(1, |w| encode_node_contents(w, contents));
            }
            ElementKind::Parameter(Some(contents)) => {
                w.context(1, |w| encode_parameter_contents(w, contents));
            }
            ElementKind::Function(Some(contents)) => {
                w.context(1, |w| encode_function_contents(w, contents));
            }
            ElementKind::Matrix(body) => {
                if let Some(contents) = &body.contents {
                    w.context(1, |w| encode_matrix_contents(w, contents));
                }
            }
            _ => {}
        }

        if let Some(children) = &element.children {
            w.context(2, |w| {
                w.sequence(Tag::application(tags::ELEMENT_COLLECTION), |w| {
                    for child in children {
                        w.context(0, |w| encode_fragment(w, child));
                    }
                });
            });
        }

        if let ElementKind::Matrix(body) = &element.kind {
            encode_matrix_routing(w, body);
        }
    });
}

fn encode_value(w: &mut BerWriter, value: &Value) {
    match value {
        Value::Integer(v) => w.write_integer(*v),
        Value::Real(v) => w.write_real(*v),
        Value::String(v) => w.write_utf8(v),
        Value::Boolean(v) => w.write_bool(*v),
        Value::Octets(v) => w.write_octets(v),
        Value::Null => w.write_null(),
    }
}

fn field_utf8(w: &mut BerWriter, number: u32, value: &Option<String>) {
    if let Some(value) = value {
        w.context(number, |w| w.write_utf8(value));
    }
}

fn field_bool(w: &mut BerWriter, number: u32, value: Option<bool>) {
    if let Some(value) = value {
        w.context(number, |w| w.write_bool(value));
    }
}

fn field_integer(w: &mut BerWriter, number: u32, value: Option<i64>) {
    if let Some(value) = value {
        w.context(number, |w| w.write_integer(value));
    }
}

fn field_value(w: &mut BerWriter, number: u32, value: &Option<Value>) {
    if let Some(value) = value {
        w.context(number, |w| encode_value(w, value));
    }
}

fn field_path(w: &mut BerWriter, number: u32, value: &Option<super::TreePath>) {
    if let Some(path) = value {
        w.context(number, |w| w.write_relative_oid(path.components()));
    }
}

fn encode_node_contents(w: &mut BerWriter, c: &NodeContents) {
    w.sequence(Tag::SET, |w| {
        field_utf8(w, 0, &c.identifier);
        field_utf8(w, 1, &c.description);
        field_bool(w, 2, c.is_root);
        field_bool(w, 3, c.is_online);
        field_utf8(w, 4, &c.schema_identifiers);
        field_path(w, 5, &c.template_reference);
    });
}

fn encode_parameter_contents(w: &mut BerWriter, c: &ParameterContents) {
    w.sequence(Tag::SET, |w| {
        field_utf8(w, 0, &c.identifier);
        field_utf8(w, 1, &c.description);
        field_value(w, 2, &c.value);
        field_value(w, 3, &c.minimum);
        field_value(w, 4, &c.maximum);
        field_integer(w, 5, c.access.map(|a| a.code()));
        field_utf8(w, 6, &c.format);
        field_utf8(w, 7, &c.enumeration);
        field_integer(w, 8, c.factor);
        field_bool(w, 9, c.is_online);
        field_utf8(w, 10, &c.formula);
        field_integer(w, 11, c.step);
        field_value(w, 12, &c.default);
        field_integer(w, 13, c.kind.map(|k| k.code()));
        field_integer(w, 14, c.stream_identifier);
        if let Some(entries) = &c.enum_map {
            w.context(15, |w| encode_enum_map(w, entries));
        }
        if let Some(descriptor) = &c.stream_descriptor {
            w.context(16, |w| {
                w.sequence(Tag::application(tags::STREAM_DESCRIPTION), |w| {
                    w.context(0, |w| w.write_integer(descriptor.format));
                    w.context(1, |w| w.write_integer(descriptor.offset));
                });
            });
        }
        field_utf8(w, 17, &c.schema_identifiers);
        field_path(w, 18, &c.template_reference);
    });
}

fn encode_enum_map(w: &mut BerWriter, entries: &[StringIntegerPair]) {
    w.sequence(Tag::application(tags::STRING_INTEGER_COLLECTION), |w| {
        for entry in entries {
            w.context(0, |w| {
                w.sequence(Tag::application(tags::STRING_INTEGER_PAIR), |w| {
                    w.context(0, |w| w.write_utf8(&entry.name));
                    w.context(1, |w| w.write_integer(entry.value));
                });
            });
        }
    });
}

fn encode_matrix_contents(w: &mut BerWriter, c: &MatrixContents) {
    w.sequence(Tag::SET, |w| {
        field_utf8(w, 0, &c.identifier);
        field_utf8(w, 1, &c.description);
        field_integer(w, 2, c.kind.map(|k| k.code()));
        field_integer(w, 3, c.mode.map(|m| m.code()));
        field_integer(w, 4, c.target_count.map(i64::from));
        field_integer(w, 5, c.source_count.map(i64::from));
        field_integer(w, 6, c.maximum_total_connects.map(i64::from));
        field_integer(w, 7, c.maximum_connects_per_target.map(i64::from));
        match &c.parameters_location {
            Some(ParametersLocation::BasePath(path)) => {
                w.context(8, |w| w.write_relative_oid(path.components()));
            }
            Some(ParametersLocation::Inline(number)) => {
                w.context(8, |w| w.write_integer(i64::from(*number)));
            }
            None => {}
        }
        field_integer(w, 9, c.gain_parameter_number.map(i64::from));
        if let Some(labels) = &c.labels {
            w.context(10, |w| encode_labels(w, labels));
        }
        field_utf8(w, 11, &c.schema_identifiers);
        field_path(w, 12, &c.template_reference);
    });
}

fn encode_labels(w: &mut BerWriter, labels: &[Label]) {
    w.sequence(Tag::SEQUENCE, |w| {
        for label in labels {
            w.context(0, |w| {
                w.sequence(Tag::application(tags::LABEL), |w| {
                    w.context(0, |w| w.write_relative_oid(label.base_path.components()));
                    w.context(1, |w| w.write_utf8(&label.description));
                });
            });
        }
    });
}

fn encode_function_contents(w: &mut BerWriter, c: &FunctionContents) {
    w.sequence(Tag::SET, |w| {
        field_utf8(w, 0, &c.identifier);
        field_utf8(w, 1, &c.description);
        if let Some(arguments) = &c.arguments {
            w.context(2, |w| encode_tuple_description(w, arguments));
        }
        if let Some(result) = &c.result {
            w.context(3, |w| encode_tuple_description(w, result));
        }
        field_path(w, 4, &c.template_reference);
    });
}

fn encode_tuple_description(w: &mut BerWriter, items: &[TupleItem]) {
    w.sequence(Tag::SEQUENCE, |w| {
        for item in items {
            w.context(0, |w| {
                w.sequence(Tag::application(tags::TUPLE_ITEM_DESCRIPTION), |w| {
                    w.context(0, |w| w.write_integer(item.kind.code()));
                    if let Some(name) = &item.name {
                        w.context(1, |w| w.write_utf8(name));
                    }
                });
            });
        }
    });
}

fn encode_matrix_routing(w: &mut BerWriter, body: &MatrixBody) {
    if let Some(targets) = &body.targets {
        w.context(3, |w| encode_signals(w, tags::TARGET, targets));
    }
    if let Some(sources) = &body.sources {
        w.context(4, |w| encode_signals(w, tags::SOURCE, sources));
    }
    if let Some(connections) = &body.connections {
        w.context(5, |w| encode_connections(w, connections));
    }
}

fn encode_signals(w: &mut BerWriter, signal_tag: u32, signals: &[u32]) {
    w.sequence(Tag::SEQUENCE, |w| {
        for number in signals {
            w.context(0, |w| {
                w.sequence(Tag::application(signal_tag), |w| {
                    w.context(0, |w| w.write_integer(i64::from(*number)));
                });
            });
        }
    });
}

fn encode_connections(w: &mut BerWriter, connections: &BTreeMap<u32, MatrixConnection>) {
    w.sequence(Tag::SEQUENCE, |w| {
        for connection in connections.values() {
            w.context(0, |w| encode_connection(w, connection));
        }
    });
}

fn encode_connection(w: &mut BerWriter, connection: &MatrixConnection) {
    w.sequence(Tag::application(tags::CONNECTION), |w| {
        w.context(0, |w| w.write_integer(i64::from(connection.target)));
        w.context(1, |w| w.write_relative_oid(&connection.sources));
        field_integer(w, 2, connection.operation.map(|o| o.code()));
        field_integer(w, 3, connection.disposition.map(|d| d.code()));
    });
}

fn encode_command(w: &mut BerWriter, command: &Command) {
    w.sequence(Tag::application(tags::COMMAND), |w| {
        w.context(0, |w| w.write_integer(i64::from(command.kind.number())));
        field_integer(w, 1, command.dir_field_mask);
        if let Some(invocation) = &command.invocation {
            w.context(2, |w| encode_invocation(w, invocation));
        }
    });
}

fn encode_value_list(w: &mut BerWriter, values: &[Value]) {
    w.sequence(Tag::SEQUENCE, |w| {
        for value in values {
            w.context(0, |w| encode_value(w, value));
        }
    });
}

fn encode_invocation(w: &mut BerWriter, invocation: &Invocation) {
    w.sequence(Tag::application(tags::INVOCATION), |w| {
        field_integer(w, 0, invocation.id.map(i64::from));
        w.context(1, |w| encode_value_list(w, &invocation.arguments));
    });
}

fn encode_invocation_result(w: &mut BerWriter, result: &InvocationResult) {
    w.sequence(Tag::application(tags::INVOCATION_RESULT), |w| {
        w.context(0, |w| w.write_integer(i64::from(result.id)));
        w.context(1, |w| w.write_bool(result.success));
        if !result.result.is_empty() {
            w.context(2, |w| encode_value_list(w, &result.result));
        }
    });
}

fn encode_stream_entry(w: &mut BerWriter, entry: &StreamEntry) {
    w.sequence(Tag::application(tags::STREAM_ENTRY), |w| {
        w.context(0, |w| w.write_integer(entry.identifier));
        w.context(1, |w| encode_value(w, &entry.value));
    });
}
