//! Short link creation
//!
//! Creation is synchronous only up to the registry write. Safety,
//! reachability and QR work are handed off to the background subsystems.

use chrono::Utc;
use tracing::{debug, info};

use crate::database::QrUpgrade;
use crate::error::{AppError, Result};
use crate::hashing::{hash_url, is_valid_url};
use crate::model::{CreateProperties, Safety, ShortLink, DEFAULT_REDIRECT_MODE};
use crate::qr::QrJob;
use crate::state::AppState;

/// Creates (or finds) the short link for `url`.
///
/// - An existing link classified unsafe fails with `Unsafe`.
/// - An existing link without QR is upgraded when `props.qr` is set.
/// - Any other existing link is returned as is, without new background work.
/// - A new URL is validated, stored as `Unknown` and queued for every
///   enrichment.
///
/// Queue slots are reserved before anything is written and wait for
/// capacity. A caller dropped while waiting leaves the registry untouched.
pub async fn create_short_link(state: &AppState, url: &str, props: CreateProperties) -> Result<ShortLink> {
    let hash = hash_url(url)?;

    if let Some(existing) = state.registry.find_by_key(&hash)? {
        if existing.safety == Safety::Unsafe {
            return Err(AppError::Unsafe(url.to_string()));
        }
        if existing.qr || !props.qr {
            debug!("link {} already exists", hash);
            return Ok(existing);
        }

        let qr_slot = state.qr.reserve().await;
        match state.registry.upgrade_qr(&hash, &props.ip, props.sponsor.clone())? {
            QrUpgrade::Upgraded(upgraded) => {
                if let Some(slot) = qr_slot {
                    slot.send(QrJob {
                        hash: hash.clone(),
                        url: state.short_url(&hash),
                    });
                }
                info!("link {} upgraded with QR", hash);
                return Ok(upgraded);
            }
            QrUpgrade::Unchanged(link) => return Ok(link),
            QrUpgrade::Unsafe(_) => return Err(AppError::Unsafe(url.to_string())),
            // Deleted while waiting for the slot; create it from scratch
            QrUpgrade::Missing => {}
        }
    }

    if !is_valid_url(url) {
        return Err(AppError::InvalidInput(url.to_string()));
    }

    let probe_slot = state.reachability.reserve().await;
    let qr_slot = if props.qr { state.qr.reserve().await } else { None };

    let link = state.registry.save(&ShortLink {
        hash: hash.clone(),
        target: url.to_string(),
        created_at: Utc::now(),
        sponsor: props.sponsor,
        owner_ip: props.ip,
        qr: props.qr,
        safety: Safety::Unknown,
        mode: DEFAULT_REDIRECT_MODE,
    })?;

    state.safety.dispatch(url, &hash);
    if let Some(slot) = probe_slot {
        slot.send(url.to_string());
    }
    if let Some(slot) = qr_slot {
        slot.send(QrJob {
            hash: hash.clone(),
            url: state.short_url(&hash),
        });
    }

    info!("link {} created for {}", hash, url);
    Ok(link)
}
