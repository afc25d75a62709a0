//! azop operator: cloud resource kinds, their managers and the process wiring
//! around the reconciliation engine.

pub mod cloud;
pub mod kind;
pub mod managers;
pub mod manifest;
pub mod naming;
pub mod secrets;
pub mod settings;

pub use cloud::{CloudError, CloudResourceId, ControlPlane, SimulatedControlPlane};
pub use kind::{AzureSpec, Kind};
pub use managers::{CloudContext, KindManager, Typed, build_registry};
pub use manifest::{Declaration, Manifest, ManifestError, SyncReport, sync_manifest};
pub use secrets::{SecretBackend, SecretData, SecretError, SecretGateway};
pub use settings::{CloudSettings, SettingsError};
