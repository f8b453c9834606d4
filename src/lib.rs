// (c) 2024 Ross Younger

#![allow(clippy::doc_markdown)]
//! `simcam` is a simulated camera session engine.
//!
//! It behaves like a remotely controllable camera, with realistic delays and the same
//! rules a real camera applies, so that camera-control client software can be developed
//! and tested without any hardware.
//!
//! ## Overview
//!
//! - 🔍 **Discovery**: a [`SimulatorRegistry`] finds a single simulated camera over a
//!   configurable transport, after a short delay.
//! - 🔐 **Connection**: connecting may require [authentication](camera::AuthenticationEvent)
//!   (pair-on-device, username and password, or a four-digit code), then loads the camera's
//!   properties. Disconnection can be expected (client-initiated) or not.
//! - 🎛️ **Command categories**: a [`Camera`] is always in some [`CommandCategorySet`] of
//!   stills shooting, video recording and filesystem access. Only certain combinations are
//!   supported, and most operations require a particular category.
//! - ⚙️ **Properties**: exposure settings (aperture, shutter speed, ISO, exposure compensation)
//!   as enumerated lists or stepped values, plus a set of fixed informational properties.
//!   Values follow the auto-exposure mode and changes are published to observers.
//! - 📷 **Shooting**: autofocus and shutter, with a preview of each shot offered to
//!   registered [transfer handlers](transfer).
//! - 🎥 **Video**: recording with an elapsed-time timer.
//! - 📺 **Live view**: frames cycled from a configured list of images, with consumer-driven
//!   backpressure.
//! - 💾 **Storage**: a local directory presented as the camera's card, browsable and
//!   streamable in chunks, with thumbnails, previews and metadata.
//!
//! ## Getting started
//!
//! ```no_run
//! # async fn demo() -> anyhow::Result<()> {
//! use simcam::{Camera, SimulatorConfiguration};
//! use simcam::camera::ConnectFlags;
//!
//! let config = SimulatorConfiguration::system_default().clone();
//! let camera = Camera::new(config);
//! let (auth_tx, _auth_rx) = tokio::sync::mpsc::unbounded_channel();
//! let warnings = camera.connect(ConnectFlags::default(), auth_tx).await?;
//! println!("connected with {} warning(s)", warnings.len());
//! camera.invoke_one_shot_shutter().await?;
//! camera.disconnect().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Timing
//!
//! Every operation waits for a delay chosen by the configured
//! [connection speed](config::ConnectionSpeed) and the size of the operation.
//! All delays use the tokio clock, so tests may run with a paused clock.
//!
//! ## Configuration
//!
//! See [config] for the sources the configuration is read from and the file format.
//!
//! ## Logging
//!
//! The crate emits [tracing] events. Applications that don't have a subscriber of
//! their own may use [`util::setup_tracing`].
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

pub mod camera;
pub use camera::{Camera, ConnectionState, ConnectionStatus, DeviceInfo};

pub mod category;
pub use category::CommandCategorySet;

pub mod codec;
pub use codec::{ImageCodec, ImageMetadata, StandardCodec};

pub mod config;
pub use config::SimulatorConfiguration;

mod error;
pub use error::CameraError;

pub mod exposure;
pub mod live_view;

pub mod property;
pub use property::{Property, PropertyIdentifier, PropertyValue};

pub mod registry;
pub use registry::SimulatorRegistry;

pub mod storage;
pub mod transfer;
pub mod util;
