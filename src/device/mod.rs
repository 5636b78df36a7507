//! Device report: external collaborators composed with the tab snapshot.
//!
//! System and media queries are opaque, fire-once snapshot providers. A
//! media failure is reported as one error string on [`DeviceInfo`] and never
//! touches the discovery/focus half of the report.

pub mod user_agent;

use std::future::Future;

use thiserror::Error;

use crate::snapshot::Snapshot;

const UNNAMED_MICROPHONE: &str = "Unnamed Microphone";
const FALLBACK_ERROR: &str = "Could not access device info";

/// Operating system, browser and device class of the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SystemInfo {
    pub platform: String,
    pub os_name: String,
    pub os_version: String,
    pub browser: String,
    pub browser_version: String,
    /// `desktop`, `tablet` or `mobile`.
    pub device_type: String,
}

/// Synchronous platform query.
pub trait SystemInfoProvider {
    fn system_info(&self) -> SystemInfo;
}

/// Classifies a user-agent string.
#[derive(Debug, Clone)]
pub struct UserAgentProvider {
    pub user_agent: String,
    pub platform: String,
}

impl SystemInfoProvider for UserAgentProvider {
    fn system_info(&self) -> SystemInfo {
        user_agent::parse(&self.user_agent, &self.platform)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
    VideoInput,
}

/// One entry of the platform's device enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDevice {
    pub device_id: String,
    pub kind: DeviceKind,
    /// Empty when the platform withholds labels.
    pub label: String,
}

/// An audio input as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Microphone {
    pub device_id: String,
    pub label: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioSettings {
    pub sample_rate: Option<u32>,
    pub latency: Option<f64>,
    pub channel_count: Option<u32>,
    pub noise_suppression: Option<bool>,
    pub echo_cancellation: Option<bool>,
    pub auto_gain_control: Option<bool>,
}

/// The input the platform picked by default, with its track settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveMicrophone {
    pub microphone: Microphone,
    pub settings: AudioSettings,
}

/// The track obtained by opening the default audio input.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AudioCapture {
    pub device_id: Option<String>,
    pub settings: AudioSettings,
}

/// Geometry of one display, in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenInfo {
    pub width: u32,
    pub height: u32,
    pub color_depth: u32,
    pub is_primary: bool,
}

/// A failed media or display query. The message is shown as-is.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeviceError {
    #[error("{0}")]
    PermissionDenied(String),
    #[error("{0}")]
    Hardware(String),
}

/// Asynchronous media and display queries.
///
/// `open_audio` is expected to release the capture before returning; only
/// the active device id and its settings are kept.
pub trait MediaProvider: Send + Sync {
    fn open_audio(&self) -> impl Future<Output = Result<AudioCapture, DeviceError>> + Send;

    fn enumerate_devices(&self) -> impl Future<Output = Result<Vec<MediaDevice>, DeviceError>> + Send;

    /// Every attached display. May be unsupported.
    fn screen_details(&self) -> impl Future<Output = Result<Vec<ScreenInfo>, DeviceError>> + Send;

    /// The display this context is on; always available.
    fn primary_screen(&self) -> ScreenInfo;
}

/// The composed report handed to the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceInfo {
    pub system: SystemInfo,
    pub microphones: Vec<Microphone>,
    pub active_microphone: Option<ActiveMicrophone>,
    pub screens: Vec<ScreenInfo>,
    pub tab: Snapshot,
    pub error: Option<String>,
}

impl DeviceInfo {
    pub async fn collect<S, M>(system: &S, media: &M, tab: Snapshot) -> Self
    where
        S: SystemInfoProvider + ?Sized,
        M: MediaProvider,
    {
        let system = system.system_info();
        let screens = collect_screens(media).await;

        let (microphones, active_microphone, error) = match collect_microphones(media).await {
            Ok((mics, active)) => (mics, active, None),
            Err(e) => {
                tracing::warn!(error = %e, "media device query failed");
                let message = e.to_string();
                let message = if message.is_empty() {
                    FALLBACK_ERROR.to_string()
                } else {
                    message
                };
                (Vec::new(), None, Some(message))
            }
        };

        Self {
            system,
            microphones,
            active_microphone,
            screens,
            tab,
            error,
        }
    }

    /// Replace the tab half with a newer snapshot.
    pub fn with_tab(mut self, tab: Snapshot) -> Self {
        self.tab = tab;
        self
    }
}

async fn collect_screens<M: MediaProvider>(media: &M) -> Vec<ScreenInfo> {
    let screens = match media.screen_details().await {
        Ok(screens) => screens,
        Err(e) => {
            tracing::debug!(error = %e, "multi-screen query unavailable");
            Vec::new()
        }
    };
    if screens.is_empty() {
        vec![ScreenInfo {
            is_primary: true,
            ..media.primary_screen()
        }]
    } else {
        screens
    }
}

async fn collect_microphones<M: MediaProvider>(
    media: &M,
) -> Result<(Vec<Microphone>, Option<ActiveMicrophone>), DeviceError> {
    let capture = media.open_audio().await?;
    let devices = media.enumerate_devices().await?;

    let microphones: Vec<Microphone> = devices
        .into_iter()
        .filter(|d| d.kind == DeviceKind::AudioInput)
        .map(|d| Microphone {
            device_id: d.device_id,
            label: if d.label.is_empty() {
                UNNAMED_MICROPHONE.to_string()
            } else {
                d.label
            },
        })
        .collect();

    let active = capture.device_id.as_deref().and_then(|id| {
        microphones
            .iter()
            .find(|m| m.device_id == id)
            .map(|m| ActiveMicrophone {
                microphone: m.clone(),
                settings: capture.settings.clone(),
            })
    });

    Ok((microphones, active))
}

/// Fixed media answers, for hosts without real devices and for tests.
#[derive(Debug, Clone)]
pub struct StaticMedia {
    pub capture: Result<AudioCapture, DeviceError>,
    pub devices: Vec<MediaDevice>,
    pub screens: Result<Vec<ScreenInfo>, DeviceError>,
    pub primary: ScreenInfo,
}

impl Default for StaticMedia {
    fn default() -> Self {
        Self {
            capture: Ok(AudioCapture::default()),
            devices: Vec::new(),
            screens: Ok(Vec::new()),
            primary: ScreenInfo {
                width: 1920,
                height: 1080,
                color_depth: 24,
                is_primary: true,
            },
        }
    }
}

impl MediaProvider for StaticMedia {
    async fn open_audio(&self) -> Result<AudioCapture, DeviceError> {
        self.capture.clone()
    }

    async fn enumerate_devices(&self) -> Result<Vec<MediaDevice>, DeviceError> {
        Ok(self.devices.clone())
    }

    async fn screen_details(&self) -> Result<Vec<ScreenInfo>, DeviceError> {
        self.screens.clone()
    }

    fn primary_screen(&self) -> ScreenInfo {
        self.primary
    }
}
