// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Secret-routing request handlers. Values pass through opaquely.

use super::ListenCtx;
use crate::protocol::{Envelope, SecretPayload, SecretsPayload};
use crate::secrets::SecretMode;
use std::sync::Arc;

pub(super) async fn get(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.secrets.get(name).await {
        Ok(Some(value)) => Envelope::with(SecretPayload {
            name: name.to_string(),
            value: Some(value),
        }),
        Ok(None) => Envelope::err(format!("secret not found: {name}")),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn set(
    ctx: &Arc<ListenCtx>,
    name: &str,
    value: &str,
    mode: SecretMode,
) -> Envelope {
    match ctx.secrets.set(name, value, mode).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn delete(ctx: &Arc<ListenCtx>, name: &str) -> Envelope {
    match ctx.secrets.delete(name).await {
        Ok(()) => Envelope::ok(),
        Err(e) => Envelope::err(e.to_string()),
    }
}

pub(super) async fn list(ctx: &Arc<ListenCtx>) -> Envelope {
    match ctx.secrets.list().await {
        Ok(names) => Envelope::with(SecretsPayload { names }),
        Err(e) => Envelope::err(e.to_string()),
    }
}
