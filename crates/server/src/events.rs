use ember::ServerEvent;
use log::Level;

fn sources(sources: &[u32]) -> String {
    let list: Vec<String> = sources.iter().map(u32::to_string).collect();
    format!("[{}]", list.join(", "))
}

/// One-line description of a server event with the level it is shown at.
pub fn describe(event: &ServerEvent) -> (Level, String) {
    match event {
        ServerEvent::Listening { addr } => (Level::Info, format!("Listening on {}", addr)),
        ServerEvent::ConnectionOpened { peer, addr } => {
            (Level::Info, format!("{} connected from {}", peer, addr))
        }
        ServerEvent::ConnectionClosed { peer, addr, reason } => (
            Level::Info,
            format!("{} ({}) {}", peer, addr, reason.as_str()),
        ),
        ServerEvent::RequestReceived { peer, path, .. } => {
            let path = path
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".into());
            (Level::Debug, format!("{} request on {}", peer, path))
        }
        ServerEvent::ValueChanged {
            path,
            identifier,
            value,
            origin,
        } => {
            let name = identifier.as_deref().unwrap_or("?");
            let by = origin.map_or_else(|| "operator".to_string(), |addr| addr.to_string());
            (
                Level::Info,
                format!("{} {} = {} (by {})", path, name, value, by),
            )
        }
        ServerEvent::MatrixChanged {
            path,
            target,
            sources: s,
        } => (
            Level::Info,
            format!("{} target {} set to {}", path, target, sources(s)),
        ),
        ServerEvent::MatrixConnect {
            path,
            target,
            sources: s,
        } => (
            Level::Info,
            format!("{} target {} connect {}", path, target, sources(s)),
        ),
        ServerEvent::MatrixDisconnect {
            path,
            target,
            sources: s,
        } => (
            Level::Info,
            format!("{} target {} disconnect {}", path, target, sources(s)),
        ),
        ServerEvent::Invoked {
            path,
            invocation_id,
            success,
        } => {
            let level = if *success { Level::Info } else { Level::Warn };
            let id = invocation_id.map_or_else(|| "-".to_string(), |id| id.to_string());
            let outcome = if *success { "succeeded" } else { "failed" };
            (level, format!("Invocation {} on {} {}", id, path, outcome))
        }
        ServerEvent::Error { addr, message } => match addr {
            Some(addr) => (Level::Error, format!("{}: {}", addr, message)),
            None => (Level::Error, message.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember::Value;

    #[test]
    fn test_describe_value_change() {
        let event = ServerEvent::ValueChanged {
            path: "0.1.0".parse().unwrap(),
            identifier: Some("gain".into()),
            value: Value::Real(-3.5),
            origin: None,
        };
        let (level, text) = describe(&event);
        assert_eq!(level, Level::Info);
        assert_eq!(text, "0.1.0 gain = -3.5 (by operator)");
    }

    #[test]
    fn test_describe_matrix_connect() {
        let event = ServerEvent::MatrixConnect {
            path: "0.2".parse().unwrap(),
            target: 1,
            sources: vec![4, 5],
        };
        assert_eq!(describe(&event).1, "0.2 target 1 connect [4, 5]");
    }
}
