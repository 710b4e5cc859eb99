use crate::command::RoutedCommand;
use crate::constants::ROUTE_MSG_CMD;
use crate::error::ProtocolError;
use crate::protocol::Frame;
use crate::types::NodeAddr;

/// A command addressed to one specific node.
///
/// Intermediate hops treat the inner command as opaque; only the target
/// node decodes it, and it never forwards it again.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutedEnvelope {
    pub target: NodeAddr,
    pub origin: NodeAddr,
    pub inner: Frame,
}

impl RoutedEnvelope {
    pub fn new(
        target: NodeAddr,
        origin: NodeAddr,
        command: &RoutedCommand,
    ) -> Result<Self, ProtocolError> {
        Ok(Self {
            target,
            origin,
            inner: command.encode()?,
        })
    }

    pub fn is_for(&self, node: &NodeAddr) -> bool {
        &self.target == node
    }

    /// Decode the carried command. Only the target node should call this.
    pub fn command(&self) -> Result<RoutedCommand, ProtocolError> {
        RoutedCommand::decode(&self.inner)
    }

    pub fn to_frame(&self) -> Frame {
        Frame::new(ROUTE_MSG_CMD)
            .arg(self.target.as_str())
            .arg(self.origin.as_str())
            .with_inner(self.inner.clone())
    }

    pub fn from_frame(frame: Frame) -> Result<Self, ProtocolError> {
        if frame.name != ROUTE_MSG_CMD {
            return Err(ProtocolError::NotAnEnvelope(frame.name));
        }
        frame.require_args(2)?;
        let inner = frame
            .inner
            .ok_or_else(|| ProtocolError::NotAnEnvelope("envelope without inner command".into()))?;
        Ok(Self {
            target: NodeAddr::new(frame.args[0].as_str()),
            origin: NodeAddr::new(frame.args[1].as_str()),
            inner: *inner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ClientId;

    #[test]
    fn test_envelope_survives_the_wire() {
        let cmd = RoutedCommand::ClientRelocated {
            client: ClientId::from("alice"),
        };
        let env = RoutedEnvelope::new(NodeAddr::from("node-2"), NodeAddr::from("node-1"), &cmd)
            .unwrap();

        let text = env.to_frame().to_json().unwrap();
        let back = RoutedEnvelope::from_frame(Frame::from_json(&text).unwrap()).unwrap();

        assert!(back.is_for(&NodeAddr::from("node-2")));
        assert_eq!(back.origin, NodeAddr::from("node-1"));
        assert_eq!(back.command().unwrap(), cmd);
    }

    #[test]
    fn test_rejects_plain_frames() {
        let err = RoutedEnvelope::from_frame(Frame::new("SEND_PING")).unwrap_err();
        assert!(matches!(err, ProtocolError::NotAnEnvelope(_)));

        let no_inner = Frame::new(ROUTE_MSG_CMD).arg("a").arg("b");
        assert!(RoutedEnvelope::from_frame(no_inner).is_err());
    }
}
