use std::collections::BTreeMap;

use crate::ber::{BerReader, DecodeError, MAX_NESTING, Tag, TagClass};

use super::element::{Address, Command, Element, ElementKind, Fragment, Root};
use super::path::TreePath;
use super::tags;
use super::types::{
    Access, AddressingMode, CommandKind, ConnectionDisposition, ConnectionOperation,
    FunctionContents, Invocation, InvocationResult, Label, MatrixConnection, MatrixContents,
    MatrixType, NodeContents, ParameterContents, ParameterType, ParametersLocation,
    StreamDescriptor, StreamEntry, StringIntegerPair, TupleItem, Value,
};

pub fn decode(data: &[u8]) -> Result<Root, DecodeError> {
    let mut reader = BerReader::new(data);
    let root = decode_root(&mut reader)?;
    if !reader.is_empty() {
        return Err(DecodeError::TrailingData(reader.remaining()));
    }
    Ok(root)
}

fn decode_root(reader: &mut BerReader<'_>) -> Result<Root, DecodeError> {
    let mut seq = reader.read_sequence(Tag::application(tags::ROOT))?;
    if seq.is_empty() {
        return Ok(Root::default());
    }

    let tag = seq.peek_tag()?;
    let root = if tag.is_application(tags::ROOT_ELEMENT_COLLECTION) {
        let mut collection = seq.read_sequence(tag)?;
        let mut elements = Vec::new();
        while !collection.is_empty() {
            let mut entry = read_context(&mut collection, 0)?;
            elements.push(decode_fragment(&mut entry, 0)?);
        }
        Root::Elements(elements)
    } else if tag.is_application(tags::STREAM_COLLECTION) {
        Root::Streams(decode_streams(&mut seq.read_sequence(tag)?)?)
    } else if tag.is_application(tags::INVOCATION_RESULT) {
        Root::InvocationResult(decode_invocation_result(&mut seq.read_sequence(tag)?)?)
    } else {
        return Err(DecodeError::UnimplementedType(tag));
    };

    if !seq.is_empty() {
        return Err(DecodeError::UnimplementedType(seq.peek_tag()?));
    }
    Ok(root)
}

/// Reads a context-tagged wrapper that must carry `number`.
fn read_context<'a>(reader: &mut BerReader<'a>, number: u32) -> Result<BerReader<'a>, DecodeError> {
    reader.read_sequence(Tag::context(number))
}

/// Reads the next field of a context-tagged set or sequence.
fn next_field<'a>(reader: &mut BerReader<'a>) -> Result<(u32, BerReader<'a>), DecodeError> {
    let (tag, field) = reader.read_constructed()?;
    if tag.class != TagClass::Context {
        return Err(DecodeError::UnimplementedType(tag));
    }
    Ok((tag.number, field))
}

/// `depth` counts the elements enclosing this fragment.
fn decode_fragment(reader: &mut BerReader<'_>, depth: usize) -> Result<Fragment, DecodeError> {
    if depth >= MAX_NESTING {
        return Err(DecodeError::TooDeep(MAX_NESTING));
    }
    let tag = reader.peek_tag()?;
    if tag.class != TagClass::Application {
        return Err(DecodeError::UnimplementedType(tag));
    }
    let fragment = match tag.number {
        tags::COMMAND => Fragment::Command(decode_command(&mut reader.read_sequence(tag)?)?),
        tags::PARAMETER
        | tags::NODE
        | tags::MATRIX
        | tags::FUNCTION
        | tags::QUALIFIED_PARAMETER
        | tags::QUALIFIED_NODE
        | tags::QUALIFIED_MATRIX
        | tags::QUALIFIED_FUNCTION => Fragment::Element(decode_element(reader, tag, depth)?),
        _ => return Err(DecodeError::UnimplementedType(tag)),
    };
    if !reader.is_empty() {
        return Err(DecodeError::UnimplementedType(reader.peek_tag()?));
    }
    Ok(fragment)
}

fn decode_element(
    reader: &mut BerReader<'_>,
    tag: Tag,
    depth: usize,
) -> Result<Element, DecodeError> {
    let qualified = matches!(
        tag.number,
        tags::QUALIFIED_PARAMETER | tags::QUALIFIED_NODE | tags::QUALIFIED_MATRIX | tags::QUALIFIED_FUNCTION
    );
    let mut kind = match tag.number {
        tags::PARAMETER | tags::QUALIFIED_PARAMETER => ElementKind::Parameter(None),
        tags::MATRIX | tags::QUALIFIED_MATRIX => ElementKind::Matrix(Box::default()),
        tags::FUNCTION | tags::QUALIFIED_FUNCTION => ElementKind::Function(None),
        _ => ElementKind::Node(None),
    };

    let mut seq = reader.read_sequence(tag)?;
    let mut address = None;
    let mut children = None;

    while !seq.is_empty() {
        let field_tag = seq.peek_tag()?;
        let (number, mut field) = next_field(&mut seq)?;
        match (number, &mut kind) {
            (0, _) if qualified => {
                address = Some(Address::Path(TreePath::new(field.read_relative_oid()?)));
            }
            (0, _) => address = Some(Address::Number(field.read_u32()?)),
            (1, ElementKind::Node(contents)) => {
                *contents = Some(decode_node_contents(&mut field.read_sequence(Tag::SET)?)?);
            }
            (1, ElementKind::Parameter(contents)) => {
                *contents = Some(decode_parameter_contents(&mut field.read_sequence(Tag::SET)?)?);
            }
            (1, ElementKind::Function(contents)) => {
                *contents = Some(decode_function_contents(&mut field.read_sequence(Tag::SET)?)?);
            }
            (1, ElementKind::Matrix(body)) => {
                body.contents = Some(decode_matrix_contents(&mut field.read_sequence(Tag::SET)?)?);
            }
            (2, _) => children = Some(decode_children(&mut field, depth + 1)?),
            (3, ElementKind::Matrix(body)) => {
                body.targets = Some(decode_signals(&mut field, tags::TARGET)?);
            }
            (4, ElementKind::Matrix(body)) => {
                body.sources = Some(decode_signals(&mut field, tags::SOURCE)?);
            }
            (5, ElementKind::Matrix(body)) => {
                body.connections = Some(decode_connections(&mut field)?);
            }
            _ => return Err(DecodeError::UnimplementedType(field_tag)),
        }
    }

    let address = address.ok_or(DecodeError::MissingField("element address"))?;
    Ok(Element {
        address,
        kind,
        children,
    })
}

fn decode_children(
    reader: &mut BerReader<'_>,
    depth: usize,
) -> Result<Vec<Fragment>, DecodeError> {
    let mut collection = reader.read_sequence(Tag::application(tags::ELEMENT_COLLECTION))?;
    let mut children = Vec::new();
    while !collection.is_empty() {
        let mut entry = read_context(&mut collection, 0)?;
        children.push(decode_fragment(&mut entry, depth)?);
    }
    Ok(children)
}

fn decode_value(reader: &mut BerReader<'_>) -> Result<Value, DecodeError> {
    let tag = reader.peek_tag()?;
    let value = if tag.matches(Tag::INTEGER) {
        Value::Integer(reader.read_integer()?)
    } else if tag.matches(Tag::REAL) {
        Value::Real(reader.read_real()?)
    } else if tag.matches(Tag::UTF8_STRING) {
        Value::String(reader.read_utf8()?)
    } else if tag.matches(Tag::BOOLEAN) {
        Value::Boolean(reader.read_bool()?)
    } else if tag.matches(Tag::OCTET_STRING) {
        Value::Octets(reader.read_octets()?)
    } else if tag.matches(Tag::NULL) {
        reader.read_null()?;
        Value::Null
    } else {
        return Err(DecodeError::UnimplementedType(tag));
    };
    Ok(value)
}

fn decode_code<T>(
    reader: &mut BerReader<'_>,
    what: &'static str,
    from_code: fn(i64) -> Option<T>,
) -> Result<T, DecodeError> {
    from_code(reader.read_integer()?).ok_or(DecodeError::InvalidValue(what))
}

fn decode_node_contents(set: &mut BerReader<'_>) -> Result<NodeContents, DecodeError> {
    let mut contents = NodeContents::default();
    while !set.is_empty() {
        let tag = set.peek_tag()?;
        let (number, mut field) = next_field(set)?;
        match number {
            0 => contents.identifier = Some(field.read_utf8()?),
            1 => contents.description = Some(field.read_utf8()?),
            2 => contents.is_root = Some(field.read_bool()?),
            3 => contents.is_online = Some(field.read_bool()?),
            4 => contents.schema_identifiers = Some(field.read_utf8()?),
            5 => contents.template_reference = Some(field.read_relative_oid()?.into()),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(contents)
}

fn decode_parameter_contents(set: &mut BerReader<'_>) -> Result<ParameterContents, DecodeError> {
    let mut contents = ParameterContents::default();
    while !set.is_empty() {
        let tag = set.peek_tag()?;
        let (number, mut field) = next_field(set)?;
        match number {
            0 => contents.identifier = Some(field.read_utf8()?),
            1 => contents.description = Some(field.read_utf8()?),
            2 => contents.value = Some(decode_value(&mut field)?),
            3 => contents.minimum = Some(decode_value(&mut field)?),
            4 => contents.maximum = Some(decode_value(&mut field)?),
            5 => contents.access = Some(decode_code(&mut field, "access", Access::from_code)?),
            6 => contents.format = Some(field.read_utf8()?),
            7 => contents.enumeration = Some(field.read_utf8()?),
            8 => contents.factor = Some(field.read_integer()?),
            9 => contents.is_online = Some(field.read_bool()?),
            10 => contents.formula = Some(field.read_utf8()?),
            11 => contents.step = Some(field.read_integer()?),
            12 => contents.default = Some(decode_value(&mut field)?),
            13 => {
                contents.kind = Some(decode_code(&mut field, "parameter type", ParameterType::from_code)?)
            }
            14 => contents.stream_identifier = Some(field.read_integer()?),
            15 => contents.enum_map = Some(decode_enum_map(&mut field)?),
            16 => contents.stream_descriptor = Some(decode_stream_descriptor(&mut field)?),
            17 => contents.schema_identifiers = Some(field.read_utf8()?),
            18 => contents.template_reference = Some(field.read_relative_oid()?.into()),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(contents)
}

fn decode_enum_map(reader: &mut BerReader<'_>) -> Result<Vec<StringIntegerPair>, DecodeError> {
    let mut collection = reader.read_sequence(Tag::application(tags::STRING_INTEGER_COLLECTION))?;
    let mut entries = Vec::new();
    while !collection.is_empty() {
        let mut entry = read_context(&mut collection, 0)?;
        let mut pair = entry.read_sequence(Tag::application(tags::STRING_INTEGER_PAIR))?;
        let mut name = None;
        let mut value = None;
        while !pair.is_empty() {
            let tag = pair.peek_tag()?;
            let (number, mut field) = next_field(&mut pair)?;
            match number {
                0 => name = Some(field.read_utf8()?),
                1 => value = Some(field.read_integer()?),
                _ => return Err(DecodeError::UnimplementedType(tag)),
            }
        }
        entries.push(StringIntegerPair {
            name: name.ok_or(DecodeError::MissingField("enum entry name"))?,
            value: value.ok_or(DecodeError::MissingField("enum entry value"))?,
        });
    }
    Ok(entries)
}

fn decode_stream_descriptor(reader: &mut BerReader<'_>) -> Result<StreamDescriptor, DecodeError> {
    let mut seq = reader.read_sequence(Tag::application(tags::STREAM_DESCRIPTION))?;
    let mut format = None;
    let mut offset = None;
    while !seq.is_empty() {
        let tag = seq.peek_tag()?;
        let (number, mut field) = next_field(&mut seq)?;
        match number {
            0 => format = Some(field.read_integer()?),
            1 => offset = Some(field.read_integer()?),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(StreamDescriptor {
        format: format.ok_or(DecodeError::MissingField("stream format"))?,
        offset: offset.ok_or(DecodeError::MissingField("stream offset"))?,
    })
}

fn decode_matrix_contents(set: &mut BerReader<'_>) -> Result<MatrixContents, DecodeError> {
    let mut contents = MatrixContents::default();
    while !set.is_empty() {
        let tag = set.peek_tag()?;
        let (number, mut field) = next_field(set)?;
        match number {
            0 => contents.identifier = Some(field.read_utf8()?),
            1 => contents.description = Some(field.read_utf8()?),
            2 => contents.kind = Some(decode_code(&mut field, "matrix type", MatrixType::from_code)?),
            3 => {
                contents.mode = Some(decode_code(&mut field, "addressing mode", AddressingMode::from_code)?)
            }
            4 => contents.target_count = Some(field.read_u32()?),
            5 => contents.source_count = Some(field.read_u32()?),
            6 => contents.maximum_total_connects = Some(field.read_u32()?),
            7 => contents.maximum_connects_per_target = Some(field.read_u32()?),
            8 => {
                let location = if field.peek_tag()?.matches(Tag::RELATIVE_OID) {
                    ParametersLocation::BasePath(field.read_relative_oid()?.into())
                } else {
                    ParametersLocation::Inline(field.read_u32()?)
                };
                contents.parameters_location = Some(location);
            }
            9 => contents.gain_parameter_number = Some(field.read_u32()?),
            10 => contents.labels = Some(decode_labels(&mut field)?),
            11 => contents.schema_identifiers = Some(field.read_utf8()?),
            12 => contents.template_reference = Some(field.read_relative_oid()?.into()),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(contents)
}

fn decode_labels(reader: &mut BerReader<'_>) -> Result<Vec<Label>, DecodeError> {
    let mut seq = reader.read_sequence(Tag::SEQUENCE)?;
    let mut labels = Vec::new();
    while !seq.is_empty() {
        let mut entry = read_context(&mut seq, 0)?;
        let mut label = entry.read_sequence(Tag::application(tags::LABEL))?;
        let mut base_path = None;
        let mut description = None;
        while !label.is_empty() {
            let tag = label.peek_tag()?;
            let (number, mut field) = next_field(&mut label)?;
            match number {
                0 => base_path = Some(TreePath::new(field.read_relative_oid()?)),
                1 => description = Some(field.read_utf8()?),
                _ => return Err(DecodeError::UnimplementedType(tag)),
            }
        }
        labels.push(Label {
            base_path: base_path.ok_or(DecodeError::MissingField("label base path"))?,
            description: description.ok_or(DecodeError::MissingField("label description"))?,
        });
    }
    Ok(labels)
}

fn decode_function_contents(set: &mut BerReader<'_>) -> Result<FunctionContents, DecodeError> {
    let mut contents = FunctionContents::default();
    while !set.is_empty() {
        let tag = set.peek_tag()?;
        let (number, mut field) = next_field(set)?;
        match number {
            0 => contents.identifier = Some(field.read_utf8()?),
            1 => contents.description = Some(field.read_utf8()?),
            2 => contents.arguments = Some(decode_tuple_description(&mut field)?),
            3 => contents.result = Some(decode_tuple_description(&mut field)?),
            4 => contents.template_reference = Some(field.read_relative_oid()?.into()),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(contents)
}

fn decode_tuple_description(reader: &mut BerReader<'_>) -> Result<Vec<TupleItem>, DecodeError> {
    let mut seq = reader.read_sequence(Tag::SEQUENCE)?;
    let mut items = Vec::new();
    while !seq.is_empty() {
        let mut entry = read_context(&mut seq, 0)?;
        let mut item = entry.read_sequence(Tag::application(tags::TUPLE_ITEM_DESCRIPTION))?;
        let mut kind = None;
        let mut name = None;
        while !item.is_empty() {
            let tag = item.peek_tag()?;
            let (number, mut field) = next_field(&mut item)?;
            match number {
                0 => kind = Some(decode_code(&mut field, "parameter type", ParameterType::from_code)?),
                1 => name = Some(field.read_utf8()?),
                _ => return Err(DecodeError::UnimplementedType(tag)),
            }
        }
        items.push(TupleItem {
            kind: kind.ok_or(DecodeError::MissingField("tuple item type"))?,
            name,
        });
    }
    Ok(items)
}

fn decode_signals(reader: &mut BerReader<'_>, signal_tag: u32) -> Result<Vec<u32>, DecodeError> {
    let mut seq = reader.read_sequence(Tag::SEQUENCE)?;
    let mut signals = Vec::new();
    while !seq.is_empty() {
        let mut entry = read_context(&mut seq, 0)?;
        let mut signal = entry.read_sequence(Tag::application(signal_tag))?;
        let mut number = None;
        while !signal.is_empty() {
            let tag = signal.peek_tag()?;
            let (field_number, mut field) = next_field(&mut signal)?;
            match field_number {
                0 => number = Some(field.read_u32()?),
                _ => return Err(DecodeError::UnimplementedType(tag)),
            }
        }
        signals.push(number.ok_or(DecodeError::MissingField("signal number"))?);
    }
    Ok(signals)
}

fn decode_connections(
    reader: &mut BerReader<'_>,
) -> Result<BTreeMap<u32, MatrixConnection>, DecodeError> {
    let mut seq = reader.read_sequence(Tag::SEQUENCE)?;
    let mut connections = BTreeMap::new();
    while !seq.is_empty() {
        let mut entry = read_context(&mut seq, 0)?;
        let connection = decode_connection(&mut entry)?;
        connections.insert(connection.target, connection);
    }
    Ok(connections)
}

fn decode_connection(reader: &mut BerReader<'_>) -> Result<MatrixConnection, DecodeError> {
    let mut seq = reader.read_sequence(Tag::application(tags::CONNECTION))?;
    let mut target = None;
    let mut sources = Vec::new();
    let mut operation = None;
    let mut disposition = None;
    while !seq.is_empty() {
        let tag = seq.peek_tag()?;
        let (number, mut field) = next_field(&mut seq)?;
        match number {
            0 => target = Some(field.read_u32()?),
            1 => sources = field.read_relative_oid()?,
            2 => {
                operation = Some(decode_code(&mut field, "connection operation", ConnectionOperation::from_code)?)
            }
            3 => {
                disposition = Some(decode_code(
                    &mut field,
                    "connection disposition",
                    ConnectionDisposition::from_code,
                )?)
            }
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(MatrixConnection {
        target: target.ok_or(DecodeError::MissingField("connection target"))?,
        sources,
        operation,
        disposition,
    })
}

fn decode_command(seq: &mut BerReader<'_>) -> Result<Command, DecodeError> {
    let mut number = None;
    let mut dir_field_mask = None;
    let mut invocation = None;
    while !seq.is_empty() {
        let tag = seq.peek_tag()?;
        let (field_number, mut field) = next_field(seq)?;
        match field_number {
            0 => number = Some(field.read_u32()?),
            1 => dir_field_mask = Some(field.read_integer()?),
            2 => invocation = Some(decode_invocation(&mut field)?),
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    let number = number.ok_or(DecodeError::MissingField("command number"))?;
    Ok(Command {
        kind: CommandKind::from_number(number),
        dir_field_mask,
        invocation,
    })
}

fn decode_value_list(reader: &mut BerReader<'_>) -> Result<Vec<Value>, DecodeError> {
    let mut seq = reader.read_sequence(Tag::SEQUENCE)?;
    let mut values = Vec::new();
    while !seq.is_empty() {
        let mut entry = read_context(&mut seq, 0)?;
        values.push(decode_value(&mut entry)?);
    }
    Ok(values)
}

fn decode_invocation(reader: &mut BerReader<'_>) -> Result<Invocation, DecodeError> {
    let mut seq = reader.read_sequence(Tag::application(tags::INVOCATION))?;
    let mut id = None;
    let mut arguments = Vec::new();
    while !seq.is_empty() {
        let tag = seq.peek_tag()?;
        let (number, mut field) = next_field(&mut seq)?;
        match number {
            0 => id = Some(field.read_u32()?),
            1 => arguments = decode_value_list(&mut field)?,
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(Invocation { id, arguments })
}

fn decode_invocation_result(seq: &mut BerReader<'_>) -> Result<InvocationResult, DecodeError> {
    let mut id = None;
    let mut success = true;
    let mut result = Vec::new();
    while !seq.is_empty() {
        let tag = seq.peek_tag()?;
        let (number, mut field) = next_field(seq)?;
        match number {
            0 => id = Some(field.read_u32()?),
            1 => success = field.read_bool()?,
            2 => result = decode_value_list(&mut field)?,
            _ => return Err(DecodeError::UnimplementedType(tag)),
        }
    }
    Ok(InvocationResult {
        id: id.ok_or(DecodeError::MissingField("invocation id"))?,
        success,
        result,
    })
}

fn decode_streams(collection: &mut BerReader<'_>) -> Result<Vec<StreamEntry>, DecodeError> {
    let mut entries = Vec::new();
    while !collection.is_empty() {
        let mut wrapper = read_context(collection, 0)?;
        let mut entry = wrapper.read_sequence(Tag::application(tags::STREAM_ENTRY))?;
        let mut identifier = None;
        let mut value = None;
        while !entry.is_empty() {
            let tag = entry.peek_tag()?;
            let (number, mut field) = next_field(&mut entry)?;
            match number {
                0 => identifier = Some(field.read_integer()?),
                1 => value = Some(decode_value(&mut field)?),
                _ => return Err(DecodeError::UnimplementedType(tag)),
            }
        }
        entries.push(StreamEntry {
            identifier: identifier.ok_or(DecodeError::MissingField("stream identifier"))?,
            value: value.ok_or(DecodeError::MissingField("stream value"))?,
        });
    }
    Ok(entries)
}
