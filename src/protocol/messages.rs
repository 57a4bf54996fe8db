//! Client-server event protocol definitions

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}

/// Seconds since the Unix epoch, used for token expiry claims.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

/// Client → server events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ClientEvent {
    // Connection
    #[serde(rename = "heartbeat")]
    Heartbeat,

    // Domain events
    #[serde(rename = "location-update", rename_all = "camelCase")]
    LocationUpdate { latitude: f64, longitude: f64 },

    #[serde(rename = "panic-alert")]
    PanicAlert { alert: PanicRequest },

    #[serde(rename = "panic-resolved", rename_all = "camelCase")]
    PanicResolved { alert_id: String },
}

/// Server → client events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerEvent {
    // Connection
    #[serde(rename = "connected", rename_all = "camelCase")]
    Connected { socket_id: String },

    #[serde(rename = "heartbeat-ack")]
    HeartbeatAck,

    // Domain events
    #[serde(rename = "user-location-updated", rename_all = "camelCase")]
    UserLocationUpdated {
        user_id: String,
        location: LocationPoint,
    },

    #[serde(rename = "new-panic-alert")]
    NewPanicAlert(PanicAlert),

    #[serde(rename = "panic-alert-resolved", rename_all = "camelCase")]
    PanicAlertResolved { alert_id: String, user_id: String },

    #[serde(rename = "user-profile-updated", rename_all = "camelCase")]
    UserProfileUpdated { user_id: String, avatar: String },
}

/// Optional fields of an inbound panic raise. Missing values are coerced to
/// the emergency defaults when the alert is created.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PanicRequest {
    pub message: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
}

/// A position as accepted by the durable store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPoint {
    pub lat: f64,
    pub lng: f64,
    pub timestamp: u64,
}

/// Bare coordinates, used where no timestamp applies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

/// A durable panic alert as it travels on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PanicAlert {
    pub id: String,
    pub user_id: String,
    pub user_name: String,
    pub message: String,
    pub location: LatLng,
    pub is_resolved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_at: Option<u64>,
    pub timestamp: u64,
}

/// A group member as returned by the reconciliation roster fetch.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RosterUser {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub avatar: Option<String>,
    pub group_id: String,
    pub is_online: bool,
    pub is_panic: bool,
    pub location: Option<LocationPoint>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_update_uses_wire_field_names() {
        let json = r#"{"type":"location-update","payload":{"latitude":-6.2,"longitude":106.8}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::LocationUpdate {
                latitude,
                longitude,
            } => {
                assert_eq!(latitude, -6.2);
                assert_eq!(longitude, 106.8);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn malformed_location_payload_fails_to_parse() {
        let json = r#"{"type":"location-update","payload":{"latitude":"north","longitude":106.8}}"#;
        assert!(serde_json::from_str::<ClientEvent>(json).is_err());
    }

    #[test]
    fn panic_request_fields_are_optional() {
        let json = r#"{"type":"panic-alert","payload":{"alert":{}}}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::PanicAlert { alert } => {
                assert!(alert.message.is_none());
                assert!(alert.lat.is_none());
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn outbound_events_use_kebab_names_and_camel_case_payloads() {
        let event = ServerEvent::UserLocationUpdated {
            user_id: "17".to_string(),
            location: LocationPoint {
                lat: -6.2,
                lng: 106.8,
                timestamp: 1_700_000_000_000,
            },
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "user-location-updated");
        assert_eq!(json["payload"]["userId"], "17");
        assert_eq!(json["payload"]["location"]["lat"], -6.2);

        let event = ServerEvent::PanicAlertResolved {
            alert_id: "3".to_string(),
            user_id: "17".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "panic-alert-resolved");
        assert_eq!(json["payload"]["alertId"], "3");
        assert_eq!(json["payload"]["userId"], "17");
    }

    #[test]
    fn unresolved_alert_omits_resolution_fields() {
        let alert = PanicAlert {
            id: "1".to_string(),
            user_id: "17".to_string(),
            user_name: "Ahmad".to_string(),
            message: "tolong".to_string(),
            location: LatLng { lat: 0.0, lng: 0.0 },
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            timestamp: now_ms(),
        };
        let json = serde_json::to_value(ServerEvent::NewPanicAlert(alert)).unwrap();
        assert_eq!(json["type"], "new-panic-alert");
        assert_eq!(json["payload"]["isResolved"], false);
        assert!(json["payload"].get("resolvedBy").is_none());
        assert!(json["payload"].get("resolvedAt").is_none());
    }
}
