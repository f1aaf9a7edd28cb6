use crate::config::CorsConfig;
use http::header::{
    ACCESS_CONTROL_ALLOW_CREDENTIALS, ACCESS_CONTROL_ALLOW_HEADERS, ACCESS_CONTROL_ALLOW_METHODS,
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_EXPOSE_HEADERS, ACCESS_CONTROL_MAX_AGE, VARY,
};
use http::{HeaderMap, HeaderValue};

const PREFLIGHT_MAX_AGE_SECS: &str = "86400";

pub fn allowed_origin(config: &CorsConfig, origin: Option<&str>) -> Option<String> {
    if config.allow_origins.is_empty() {
        return Some("*".to_string());
    }

    let origin = origin?.trim();
    config
        .allow_origins
        .iter()
        .any(|allowed| origin_matches(allowed.trim(), origin))
        .then(|| origin.to_string())
}

pub fn apply_cors_headers(
    headers: &mut HeaderMap,
    config: &CorsConfig,
    allow_origin: Option<&str>,
    requested_headers: Option<&str>,
    preflight: bool,
) {
    let Some(allow_origin) = allow_origin else {
        return;
    };
    let Ok(origin_value) = HeaderValue::from_str(allow_origin) else {
        return;
    };

    headers.insert(ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    if allow_origin != "*" {
        headers.insert(
            ACCESS_CONTROL_ALLOW_CREDENTIALS,
            HeaderValue::from_static("true"),
        );
        headers.append(VARY, HeaderValue::from_static("origin"));
    }

    if preflight {
        insert_joined(headers, ACCESS_CONTROL_ALLOW_METHODS, &config.allow_methods);

        let mut allow_headers = config.allow_headers.clone();
        for requested in requested_headers
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
        {
            if !allow_headers
                .iter()
                .any(|name| name.eq_ignore_ascii_case(requested))
            {
                allow_headers.push(requested.to_ascii_lowercase());
            }
        }
        insert_joined(headers, ACCESS_CONTROL_ALLOW_HEADERS, &allow_headers);
        headers.insert(
            ACCESS_CONTROL_MAX_AGE,
            HeaderValue::from_static(PREFLIGHT_MAX_AGE_SECS),
        );
    } else {
        insert_joined(headers, ACCESS_CONTROL_EXPOSE_HEADERS, &config.expose_headers);
    }
}

fn origin_matches(allowed: &str, origin: &str) -> bool {
    if allowed == "*" || allowed.eq_ignore_ascii_case(origin) {
        return true;
    }

    if allowed.contains("://") {
        return false;
    }

    origin
        .split_once("://")
        .is_some_and(|(_, host)| host.eq_ignore_ascii_case(allowed))
}

fn insert_joined(headers: &mut HeaderMap, name: http::HeaderName, values: &[String]) {
    if values.is_empty() {
        return;
    }
    if let Ok(value) = HeaderValue::from_str(&values.join(", ")) {
        headers.insert(name, value);
    }
}
