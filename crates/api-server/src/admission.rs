use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use axum::http::HeaderMap;

/// Proxy headers consulted for the caller's address, most specific first.
const CLIENT_IP_HEADERS: [&str; 4] = [
    "x-original-client-ip",
    "cf-connecting-ip",
    "x-forwarded-for",
    "x-real-ip",
];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdmissionError {
    #[error("Too many concurrent requests. Please wait.")]
    ClientLimit,
    #[error("Server busy. Please try again shortly.")]
    ServerBusy,
}

#[derive(Debug, Default)]
struct Counters {
    global: usize,
    per_ip: HashMap<String, usize>,
}

/// Caps in-flight analyses per client address and across the server.
///
/// Both counters live behind one mutex so a check and its increment are a
/// single step.
#[derive(Debug)]
pub struct AdmissionControl {
    max_per_ip: usize,
    max_global: usize,
    counters: Mutex<Counters>,
}

impl AdmissionControl {
    pub fn new(max_per_ip: usize, max_global: usize) -> Arc<Self> {
        tracing::info!(max_per_ip, max_global, "admission control configured");
        Arc::new(Self {
            max_per_ip,
            max_global,
            counters: Mutex::new(Counters::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counter updates cannot panic midway, so a poisoned lock is still consistent.
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Reserve a slot for `ip`; the slot is released when the permit drops.
    pub fn try_acquire(self: &Arc<Self>, ip: &str) -> Result<AdmissionPermit, AdmissionError> {
        let mut counters = self.lock();

        if counters.global >= self.max_global {
            tracing::warn!(ip, in_flight = counters.global, "global concurrency limit reached");
            return Err(AdmissionError::ServerBusy);
        }
        let current = counters.per_ip.get(ip).copied().unwrap_or(0);
        if current >= self.max_per_ip {
            tracing::warn!(ip, in_flight = current, "per-client concurrency limit reached");
            return Err(AdmissionError::ClientLimit);
        }

        counters.global += 1;
        counters.per_ip.insert(ip.to_string(), current + 1);

        Ok(AdmissionPermit {
            control: Arc::clone(self),
            ip: ip.to_string(),
        })
    }

    fn release(&self, ip: &str) {
        let mut counters = self.lock();
        counters.global = counters.global.saturating_sub(1);
        match counters.per_ip.get_mut(ip) {
            Some(n) if *n > 1 => *n -= 1,
            Some(_) => {
                counters.per_ip.remove(ip);
            }
            None => {}
        }
    }

    pub fn in_flight(&self) -> usize {
        self.lock().global
    }

    pub fn in_flight_for(&self, ip: &str) -> usize {
        self.lock().per_ip.get(ip).copied().unwrap_or(0)
    }
}

/// Held for the lifetime of one admitted request.
#[derive(Debug)]
pub struct AdmissionPermit {
    control: Arc<AdmissionControl>,
    ip: String,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.control.release(&self.ip);
    }
}

/// Resolve the caller's address from proxy headers, then the socket peer.
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    for name in CLIENT_IP_HEADERS {
        let value = headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = value {
            return ip.to_string();
        }
    }
    peer.map(|addr| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
