//! Runtime permission gate.
//!
//! Step counting on Android needs a fixed set of runtime permissions. The
//! gate requests them in order and stops at the first refusal; counting only
//! starts when every one was granted. Other platforms need nothing.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Android API level that introduced the notification permission.
pub const NOTIFICATIONS_API_LEVEL: u32 = 33;

/// A runtime permission needed for step counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    /// Post notifications (Android 13+ only).
    Notifications,
    /// Physical activity recognition.
    ActivityRecognition,
    /// Precise location.
    FineLocation,
    /// Approximate location.
    CoarseLocation,
    /// Body sensors while in use.
    BodySensors,
    /// Body sensors in the background.
    BodySensorsBackground,
}

impl Permission {
    /// Every permission, in request order.
    pub const ALL: [Permission; 6] = [
        Permission::Notifications,
        Permission::ActivityRecognition,
        Permission::FineLocation,
        Permission::CoarseLocation,
        Permission::BodySensors,
        Permission::BodySensorsBackground,
    ];

    /// Config and CLI name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Permission::Notifications => "notifications",
            Permission::ActivityRecognition => "activity_recognition",
            Permission::FineLocation => "fine_location",
            Permission::CoarseLocation => "coarse_location",
            Permission::BodySensors => "body_sensors",
            Permission::BodySensorsBackground => "body_sensors_background",
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Permission::Notifications => "notifications",
            Permission::ActivityRecognition => "activity recognition",
            Permission::FineLocation => "fine location",
            Permission::CoarseLocation => "coarse location",
            Permission::BodySensors => "body sensors",
            Permission::BodySensorsBackground => "body sensors (background)",
        };
        f.write_str(label)
    }
}

impl FromStr for Permission {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        Permission::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| Error::invalid_config(format!("unknown permission '{}'", s)))
    }
}

/// Host platform, as far as permissions are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "os", rename_all = "snake_case")]
pub enum Platform {
    /// Android at the given API level.
    Android { api_level: u32 },
    /// iOS.
    Ios,
    /// Anything else (desktop, replays).
    Other,
}

impl Platform {
    /// Build from a config name (`android`, `ios`, `other`).
    pub fn from_name(name: &str, api_level: u32) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "android" => Ok(Platform::Android { api_level }),
            "ios" => Ok(Platform::Ios),
            "other" | "desktop" | "" => Ok(Platform::Other),
            other => Err(Error::invalid_config(format!("unknown platform '{}'", other))),
        }
    }

    /// Permissions to request on this platform, in order.
    pub fn required_permissions(&self) -> Vec<Permission> {
        match self {
            Platform::Android { api_level } => Permission::ALL
                .into_iter()
                .filter(|p| {
                    *p != Permission::Notifications || *api_level >= NOTIFICATIONS_API_LEVEL
                })
                .collect(),
            Platform::Ios | Platform::Other => Vec::new(),
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android { api_level } => write!(f, "android (API {})", api_level),
            Platform::Ios => f.write_str("ios"),
            Platform::Other => f.write_str("other"),
        }
    }
}

/// Whether a permission is held.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
}

impl PermissionStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, PermissionStatus::Granted)
    }
}

/// Outcome of the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateResult {
    /// Every required permission is held.
    Granted,
    /// The first permission that was refused.
    Denied(Permission),
}

impl GateResult {
    pub fn is_granted(&self) -> bool {
        matches!(self, GateResult::Granted)
    }
}

/// Platform permission API.
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current status without prompting.
    async fn check(&self, permission: Permission) -> Result<PermissionStatus>;

    /// Prompt for `permission` and report the answer.
    async fn request(&self, permission: Permission) -> Result<PermissionStatus>;
}

/// Request every permission `platform` needs, stopping at the first refusal.
///
/// Each permission is checked first and only requested when not already
/// held. Provider errors count as a refusal.
pub async fn request_all<P: PermissionProvider + ?Sized>(
    provider: &P,
    platform: Platform,
) -> GateResult {
    let required = platform.required_permissions();
    if required.is_empty() {
        debug!("No runtime permissions needed on {}", platform);
        return GateResult::Granted;
    }

    for permission in required {
        let status = match provider.check(permission).await {
            Ok(PermissionStatus::Granted) => PermissionStatus::Granted,
            Ok(PermissionStatus::Denied) => {
                debug!("Requesting {} permission", permission);
                provider.request(permission).await.unwrap_or_else(|e| {
                    warn!("Requesting {} permission failed: {}", permission, e);
                    PermissionStatus::Denied
                })
            }
            Err(e) => {
                warn!("Checking {} permission failed: {}", permission, e);
                PermissionStatus::Denied
            }
        };

        if !status.is_granted() {
            info!("{} permission denied", permission);
            return GateResult::Denied(permission);
        }
    }

    GateResult::Granted
}

/// Check every permission `platform` needs without prompting.
pub async fn check_all<P: PermissionProvider + ?Sized>(
    provider: &P,
    platform: Platform,
) -> Vec<(Permission, PermissionStatus)> {
    let mut statuses = Vec::new();
    for permission in platform.required_permissions() {
        let status = provider.check(permission).await.unwrap_or_else(|e| {
            warn!("Checking {} permission failed: {}", permission, e);
            PermissionStatus::Denied
        });
        statuses.push((permission, status));
    }
    statuses
}

/// Provider answering from a fixed grant set.
///
/// With `grant_on_request`, a request for a missing permission is answered
/// as if the user accepted the prompt.
#[derive(Debug, Default)]
pub struct StaticPermissions {
    granted: Mutex<HashSet<Permission>>,
    grant_on_request: bool,
    requested: Mutex<Vec<Permission>>,
}

impl StaticPermissions {
    /// Provider holding `granted`.
    pub fn new(granted: impl IntoIterator<Item = Permission>) -> Self {
        Self {
            granted: Mutex::new(granted.into_iter().collect()),
            ..Default::default()
        }
    }

    /// Provider holding every permission.
    pub fn all_granted() -> Self {
        Self::new(Permission::ALL)
    }

    /// Provider holding nothing and refusing every prompt.
    pub fn none() -> Self {
        Self::default()
    }

    /// Accept prompts for permissions not yet held.
    #[must_use]
    pub fn grant_on_request(mut self, grant: bool) -> Self {
        self.grant_on_request = grant;
        self
    }

    /// Permissions prompted for so far, in order.
    pub fn requested(&self) -> Vec<Permission> {
        self.requested.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn status_of(&self, permission: Permission) -> Result<PermissionStatus> {
        let granted = self
            .granted
            .lock()
            .map_err(|_| Error::invalid_config("permission set lock poisoned"))?;
        Ok(if granted.contains(&permission) {
            PermissionStatus::Granted
        } else {
            PermissionStatus::Denied
        })
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn check(&self, permission: Permission) -> Result<PermissionStatus> {
        self.status_of(permission)
    }

    async fn request(&self, permission: Permission) -> Result<PermissionStatus> {
        if let Ok(mut requested) = self.requested.lock() {
            requested.push(permission);
        }

        if self.grant_on_request
            && let Ok(mut granted) = self.granted.lock()
        {
            granted.insert(permission);
        }
        self.status_of(permission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANDROID_14: Platform = Platform::Android { api_level: 34 };
    const ANDROID_12: Platform = Platform::Android { api_level: 31 };

    struct FailingProvider;

    #[async_trait]
    impl PermissionProvider for FailingProvider {
        async fn check(&self, _permission: Permission) -> Result<PermissionStatus> {
            Err(Error::sensor("permission service unavailable"))
        }

        async fn request(&self, _permission: Permission) -> Result<PermissionStatus> {
            Err(Error::sensor("permission service unavailable"))
        }
    }

    #[test]
    fn test_required_permissions_by_api_level() {
        let modern = ANDROID_14.required_permissions();
        assert_eq!(modern.len(), 6);
        assert_eq!(modern[0], Permission::Notifications);

        let older = ANDROID_12.required_permissions();
        assert_eq!(older.len(), 5);
        assert!(!older.contains(&Permission::Notifications));
        assert_eq!(older[0], Permission::ActivityRecognition);

        assert!(Platform::Ios.required_permissions().is_empty());
    }

    #[test]
    fn test_permission_from_str() {
        assert_eq!(
            "activity-recognition".parse::<Permission>().unwrap(),
            Permission::ActivityRecognition
        );
        assert_eq!(
            "BODY_SENSORS".parse::<Permission>().unwrap(),
            Permission::BodySensors
        );
        assert!("camera".parse::<Permission>().is_err());
    }

    #[test]
    fn test_platform_from_name() {
        assert_eq!(
            Platform::from_name("Android", 34).unwrap(),
            Platform::Android { api_level: 34 }
        );
        assert_eq!(Platform::from_name("ios", 0).unwrap(), Platform::Ios);
        assert!(Platform::from_name("symbian", 0).is_err());
    }

    #[tokio::test]
    async fn test_non_android_is_granted_without_asking() {
        let provider = StaticPermissions::none();
        assert_eq!(
            request_all(&provider, Platform::Ios).await,
            GateResult::Granted
        );
        assert!(provider.requested().is_empty());
    }

    #[tokio::test]
    async fn test_all_held_is_granted_without_prompting() {
        let provider = StaticPermissions::all_granted();
        assert!(request_all(&provider, ANDROID_14).await.is_granted());
        assert!(provider.requested().is_empty());
    }

    #[tokio::test]
    async fn test_missing_permissions_are_requested() {
        let provider = StaticPermissions::new([Permission::Notifications]).grant_on_request(true);
        assert!(request_all(&provider, ANDROID_14).await.is_granted());
        assert_eq!(provider.requested().len(), 5);
    }

    #[tokio::test]
    async fn test_stops_at_first_denial() {
        let provider =
            StaticPermissions::new([Permission::Notifications, Permission::ActivityRecognition]);
        let result = request_all(&provider, ANDROID_14).await;

        assert_eq!(result, GateResult::Denied(Permission::FineLocation));
        assert_eq!(provider.requested(), vec![Permission::FineLocation]);
    }

    #[tokio::test]
    async fn test_notifications_asked_first_on_new_android() {
        let provider = StaticPermissions::none();
        let result = request_all(&provider, ANDROID_14).await;
        assert_eq!(result, GateResult::Denied(Permission::Notifications));

        let result = request_all(&provider, ANDROID_12).await;
        assert_eq!(result, GateResult::Denied(Permission::ActivityRecognition));
    }

    #[tokio::test]
    async fn test_provider_errors_count_as_denial() {
        let result = request_all(&FailingProvider, ANDROID_12).await;
        assert_eq!(result, GateResult::Denied(Permission::ActivityRecognition));

        let statuses = check_all(&FailingProvider, ANDROID_12).await;
        assert!(statuses.iter().all(|(_, s)| !s.is_granted()));
    }

    #[tokio::test]
    async fn test_check_all_never_prompts() {
        let provider = StaticPermissions::new([Permission::BodySensors]).grant_on_request(true);
        let statuses = check_all(&provider, ANDROID_14).await;

        assert_eq!(statuses.len(), 6);
        assert!(provider.requested().is_empty());
        let granted: Vec<Permission> = statuses
            .iter()
            .filter(|(_, s)| s.is_granted())
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(granted, vec![Permission::BodySensors]);
    }
}
