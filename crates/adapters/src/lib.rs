// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! sq-adapters: adapters for the worker's external collaborators
//!
//! Navigation data lookup, the positioning engine, and the notification
//! transports. Each concern has a trait, production implementations, and a
//! fake behind the `test-support` feature.

pub mod chat;
pub mod navigation;
pub mod notify;
pub mod positioning;

pub use chat::{ChatChannel, ChatError, ChatUpdate, LogChatChannel, TelegramChannel};
pub use navigation::{FsNavigationIndex, NavigationData, NavigationError, NavigationIndex};
pub use notify::{Channel, LogTransport, Notice, NotifyError, NotifyTransport, WebhookTransport};
pub use positioning::{CommandEngine, PositioningEngine};

#[cfg(any(test, feature = "test-support"))]
pub use chat::{FakeChatChannel, SentMessage};
#[cfg(any(test, feature = "test-support"))]
pub use navigation::FakeNavigationIndex;
#[cfg(any(test, feature = "test-support"))]
pub use notify::{FakeTransport, SentNotice};
#[cfg(any(test, feature = "test-support"))]
pub use positioning::{EngineCall, FakeEngine};
