//! Broker events as seen by the controller

use bytes::Bytes;
use rumqttc::{ConnectReturnCode, Event, Outgoing, Packet};

/// Events emitted by the command channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerEvent {
    /// Session established (also after an automatic reconnect)
    Connected,
    /// Session lost; the client library reconnects on its own
    Disconnected { reason: String },
    /// Broker acknowledged a subscription
    Subscribed,
    /// Broker acknowledged an unsubscription
    Unsubscribed,
    /// Inbound message, topic and payload uninterpreted
    Message { topic: Bytes, payload: Bytes },
    /// Broker refused or failed a request
    Error { reason: String },
}

impl BrokerEvent {
    /// Translate a client library event, skipping protocol chatter
    pub fn from_mqtt(event: &Event) -> Option<Self> {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => match &ack.code {
                ConnectReturnCode::Success => Some(BrokerEvent::Connected),
                code => Some(BrokerEvent::Error {
                    reason: format!("Connection refused: {:?}", code),
                }),
            },
            Event::Incoming(Packet::Publish(publish)) => Some(BrokerEvent::Message {
                topic: Bytes::copy_from_slice(publish.topic.as_bytes()),
                payload: publish.payload.clone(),
            }),
            Event::Incoming(Packet::SubAck(_)) => Some(BrokerEvent::Subscribed),
            Event::Incoming(Packet::UnsubAck(_)) => Some(BrokerEvent::Unsubscribed),
            Event::Incoming(Packet::Disconnect) => Some(BrokerEvent::Disconnected {
                reason: "Broker sent disconnect".into(),
            }),
            Event::Outgoing(Outgoing::Disconnect) => Some(BrokerEvent::Disconnected {
                reason: "Client disconnect".into(),
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rumqttc::{ConnAck, PubAck, Publish, QoS, SubAck};

    #[test]
    fn test_connack_success() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::Success,
            false,
        )));
        assert_eq!(BrokerEvent::from_mqtt(&event), Some(BrokerEvent::Connected));
    }

    #[test]
    fn test_connack_refused() {
        let event = Event::Incoming(Packet::ConnAck(ConnAck::new(
            ConnectReturnCode::BadUserNamePassword,
            false,
        )));
        assert!(matches!(
            BrokerEvent::from_mqtt(&event),
            Some(BrokerEvent::Error { .. })
        ));
    }

    #[test]
    fn test_publish_passes_bytes_through() {
        let event = Event::Incoming(Packet::Publish(Publish::new(
            "parking/gate/entry",
            QoS::AtMostOnce,
            "open",
        )));
        assert_eq!(
            BrokerEvent::from_mqtt(&event),
            Some(BrokerEvent::Message {
                topic: Bytes::from_static(b"parking/gate/entry"),
                payload: Bytes::from_static(b"open"),
            })
        );
    }

    #[test]
    fn test_suback_and_chatter() {
        let suback = Event::Incoming(Packet::SubAck(SubAck::new(1, vec![])));
        assert_eq!(BrokerEvent::from_mqtt(&suback), Some(BrokerEvent::Subscribed));

        let puback = Event::Incoming(Packet::PubAck(PubAck::new(1)));
        assert_eq!(BrokerEvent::from_mqtt(&puback), None);

        let outgoing = Event::Outgoing(Outgoing::PingReq);
        assert_eq!(BrokerEvent::from_mqtt(&outgoing), None);
    }
}
