//! Durable state: last-known locations, panic alerts, rosters
//!
//! The realtime core is the only validated write path into this state. Room
//! membership and connections are never stored here; they are rebuilt from
//! live connections alone.

use crate::auth::Claims;
use crate::protocol::{now_ms, LatLng, LocationPoint, PanicAlert, RosterUser};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Durable store failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[allow(dead_code)]
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store call timed out")]
    Timeout,
}

/// Profile fields written at admission or by the external CRUD system.
#[derive(Debug, Clone)]
pub struct UserSeed {
    pub id: String,
    pub name: String,
    pub phone: Option<String>,
    pub role: String,
    pub group_id: Option<String>,
    pub avatar: Option<String>,
}

impl UserSeed {
    pub fn from_claims(claims: &Claims) -> Self {
        Self {
            id: claims.id.clone(),
            name: claims.name.clone(),
            phone: claims.phone.clone(),
            role: claims.role.clone(),
            group_id: claims.group_id.clone(),
            avatar: None,
        }
    }
}

/// Trait for durable-state backends
#[async_trait]
pub trait Store: Send + Sync {
    /// Overwrite the subject's last-known location with receipt time,
    /// append an audit sample, and mark the subject online. Returns
    /// exactly what was written so broadcasts match the durable record.
    async fn record_location(
        &self,
        user_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<LocationPoint, StoreError>;

    /// Create an unresolved panic alert and set the subject's panic flag.
    async fn create_alert(
        &self,
        user_id: &str,
        user_name: &str,
        message: &str,
        lat: f64,
        lng: f64,
    ) -> Result<PanicAlert, StoreError>;

    async fn get_alert(&self, alert_id: &str) -> Result<Option<PanicAlert>, StoreError>;

    /// Idempotently resolve an alert; the subject's panic flag clears only
    /// once no unresolved alerts remain for them. `None` for unknown ids.
    async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_by: &str,
    ) -> Result<Option<PanicAlert>, StoreError>;

    async fn update_avatar(&self, user_id: &str, avatar: &str) -> Result<(), StoreError>;

    /// Group roster with flags and last-known locations, ordered by name.
    async fn group_roster(&self, group_id: &str) -> Result<Vec<RosterUser>, StoreError>;

    /// The group's alerts, newest first.
    async fn alerts_for_group(&self, group_id: &str) -> Result<Vec<PanicAlert>, StoreError>;

    /// Create or refresh a user record from its profile fields. Runtime
    /// flags and the cached location survive a re-seed.
    async fn upsert_user(&self, user: UserSeed) -> Result<(), StoreError>;
}

struct UserRecord {
    id: String,
    name: String,
    phone: Option<String>,
    role: String,
    group_id: Option<String>,
    avatar: Option<String>,
    is_online: bool,
    is_panic: bool,
    last_location: Option<LocationPoint>,
}

impl UserRecord {
    fn new(seed: UserSeed) -> Self {
        Self {
            id: seed.id,
            name: seed.name,
            phone: seed.phone,
            role: seed.role,
            group_id: seed.group_id,
            avatar: seed.avatar,
            is_online: false,
            is_panic: false,
            last_location: None,
        }
    }
}

/// In-memory implementation of the Store trait
pub struct MemoryStore {
    users: DashMap<String, UserRecord>,
    alerts: DashMap<String, PanicAlert>,
    /// Append-only audit trail of accepted samples; the realtime core only
    /// depends on the overwritable record on the user row.
    location_history: DashMap<String, Vec<LocationPoint>>,
    next_alert_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            users: DashMap::new(),
            alerts: DashMap::new(),
            location_history: DashMap::new(),
            next_alert_id: AtomicU64::new(0),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn record_location(
        &self,
        user_id: &str,
        lat: f64,
        lng: f64,
    ) -> Result<LocationPoint, StoreError> {
        let point = LocationPoint {
            lat,
            lng,
            timestamp: now_ms(),
        };

        self.location_history
            .entry(user_id.to_string())
            .or_default()
            .push(point.clone());

        // Unknown subjects leave only an audit sample; the roster entry
        // appears once the user record is seeded.
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.is_online = true;
            user.last_location = Some(point.clone());
        }

        Ok(point)
    }

    async fn create_alert(
        &self,
        user_id: &str,
        user_name: &str,
        message: &str,
        lat: f64,
        lng: f64,
    ) -> Result<PanicAlert, StoreError> {
        let id = self.next_alert_id.fetch_add(1, Ordering::Relaxed) + 1;
        let alert = PanicAlert {
            id: id.to_string(),
            user_id: user_id.to_string(),
            user_name: user_name.to_string(),
            message: message.to_string(),
            location: LatLng { lat, lng },
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            timestamp: now_ms(),
        };

        self.alerts.insert(alert.id.clone(), alert.clone());
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.is_panic = true;
        }

        Ok(alert)
    }

    async fn get_alert(&self, alert_id: &str) -> Result<Option<PanicAlert>, StoreError> {
        Ok(self.alerts.get(alert_id).map(|alert| alert.value().clone()))
    }

    async fn resolve_alert(
        &self,
        alert_id: &str,
        resolved_by: &str,
    ) -> Result<Option<PanicAlert>, StoreError> {
        let resolved = match self.alerts.get_mut(alert_id) {
            None => return Ok(None),
            Some(mut alert) => {
                if !alert.is_resolved {
                    alert.is_resolved = true;
                    alert.resolved_by = Some(resolved_by.to_string());
                    alert.resolved_at = Some(now_ms());
                }
                alert.clone()
            }
        };

        let owner = resolved.user_id.clone();
        let still_open = self
            .alerts
            .iter()
            .any(|alert| alert.user_id == owner && !alert.is_resolved);
        if !still_open {
            if let Some(mut user) = self.users.get_mut(&owner) {
                user.is_panic = false;
            }
        }

        Ok(Some(resolved))
    }

    async fn update_avatar(&self, user_id: &str, avatar: &str) -> Result<(), StoreError> {
        if let Some(mut user) = self.users.get_mut(user_id) {
            user.avatar = Some(avatar.to_string());
        }
        Ok(())
    }

    async fn group_roster(&self, group_id: &str) -> Result<Vec<RosterUser>, StoreError> {
        let mut roster: Vec<RosterUser> = self
            .users
            .iter()
            .filter(|user| user.group_id.as_deref() == Some(group_id))
            .map(|user| RosterUser {
                id: user.id.clone(),
                name: user.name.clone(),
                phone: user.phone.clone(),
                role: user.role.clone(),
                avatar: user.avatar.clone(),
                group_id: group_id.to_string(),
                is_online: user.is_online,
                is_panic: user.is_panic,
                location: user.last_location.clone(),
            })
            .collect();

        roster.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roster)
    }

    async fn alerts_for_group(&self, group_id: &str) -> Result<Vec<PanicAlert>, StoreError> {
        let mut alerts: Vec<PanicAlert> = self
            .alerts
            .iter()
            .filter(|alert| {
                self.users
                    .get(&alert.user_id)
                    .map(|user| user.group_id.as_deref() == Some(group_id))
                    .unwrap_or(false)
            })
            .map(|alert| alert.value().clone())
            .collect();

        // ids are numeric strings, so length-then-lex gives numeric order
        alerts.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| b.id.len().cmp(&a.id.len()))
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(alerts)
    }

    async fn upsert_user(&self, user: UserSeed) -> Result<(), StoreError> {
        self.users
            .entry(user.id.clone())
            .and_modify(|existing| {
                existing.name = user.name.clone();
                existing.phone = user.phone.clone();
                existing.role = user.role.clone();
                existing.group_id = user.group_id.clone();
                if user.avatar.is_some() {
                    existing.avatar = user.avatar.clone();
                }
            })
            .or_insert_with(|| UserRecord::new(user));
        Ok(())
    }
}
