#![allow(dead_code)]

use buildstash_core::{AppConfig, UploadRequest, Version};
use buildstash_metadata::DetectionContext;
use buildstash_uploader::Publisher;
use bytes::Bytes;
use httpmock::MockServer;
use std::collections::BTreeMap;
use std::net::TcpListener;

pub const API_KEY: &str = "test-api-key";
pub const API_PREFIX: &str = "/api/v1";

pub fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

/// Configuration pointing at the mock server's API prefix.
pub fn config_for(server: &MockServer) -> AppConfig {
    AppConfig::for_testing(server.url(API_PREFIX))
}

pub fn publisher_for(server: &MockServer) -> Publisher {
    Publisher::new(&config_for(server)).unwrap()
}

pub fn api_path(suffix: &str) -> String {
    format!("{API_PREFIX}/{}", suffix.trim_start_matches('/'))
}

pub fn bearer() -> String {
    format!("Bearer {API_KEY}")
}

/// Version 1.2.3 on the android platform, beta stream.
pub fn sample_request() -> UploadRequest {
    UploadRequest {
        version: Version::new("1", "2", "3"),
        platform: "android".to_string(),
        stream: "beta".to_string(),
        ..Default::default()
    }
}

/// A context with no SCM and no environment, so nothing is detected.
pub fn empty_context() -> DetectionContext {
    DetectionContext::new(None, BTreeMap::new())
}

/// Deterministic test data; the same seed gives the same bytes.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;

    for chunk in data.chunks_mut(8) {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        let bytes = state.to_le_bytes();
        for (i, byte) in chunk.iter_mut().enumerate() {
            *byte = bytes[i % 8];
        }
    }

    Bytes::from(data)
}

/// Like [`seeded_bytes`] but printable ASCII, so request bodies can be
/// matched as strings.
pub fn seeded_text(seed: u64, len: usize) -> Bytes {
    let alphabet = b"abcdefghijklmnopqrstuvwxyz0123456789";
    let data: Vec<u8> = seeded_bytes(seed, len)
        .iter()
        .map(|b| alphabet[*b as usize % alphabet.len()])
        .collect();
    Bytes::from(data)
}

/// `data[offset..offset + len]` as a string, for body matchers.
pub fn text_slice(data: &Bytes, offset: u64, len: u64) -> String {
    let start = offset as usize;
    String::from_utf8(data[start..start + len as usize].to_vec()).unwrap()
}
