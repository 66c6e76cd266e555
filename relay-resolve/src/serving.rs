//! Which node is answering a domain's HTTP traffic right now. This is not
//! necessarily the master; the load balancer's sticky-session cookie names
//! the node that served the request.

use relay_common::error::{RelayError, Result};
use relay_common::types::NodeAddress;
use reqwest::header::SET_COOKIE;
use tracing::debug;

/// `Ok(None)` means the response carried no node cookie.
pub async fn detect_serving_node(
    client: &reqwest::Client,
    domain: &str,
) -> Result<Option<NodeAddress>> {
    let url = if domain.starts_with("http://") || domain.starts_with("https://") {
        domain.to_string()
    } else {
        format!("https://{}", domain)
    };

    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| RelayError::Http(format!("GET {} failed: {}", url, e)))?;

    let cookies: Vec<String> = resp
        .headers()
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .map(str::to_string)
        .collect();

    let node = serving_node_from_cookies(cookies.iter().map(String::as_str));
    debug!(domain = %domain, node = ?node, "serving node detection finished");
    Ok(node)
}

/// First cookie whose value is a `host:port` token.
pub fn serving_node_from_cookies<'a>(
    cookies: impl IntoIterator<Item = &'a str>,
) -> Option<NodeAddress> {
    cookies.into_iter().find_map(|cookie| {
        let pair = cookie.split(';').next()?;
        let (_, value) = pair.split_once('=')?;
        let value = value.trim().trim_matches('"');
        match NodeAddress::split_port(value) {
            Ok((host, Some(port))) if looks_like_host(&host) => Some(NodeAddress::new(host, port)),
            _ => None,
        }
    })
}

fn looks_like_host(host: &str) -> bool {
    host.contains('.')
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_cookie_parsing() {
        let cookies = [
            "session=abc123; Path=/",
            "FDMSERVERID=10.0.0.2:16127; Path=/; HttpOnly",
        ];
        assert_eq!(
            serving_node_from_cookies(cookies),
            Some(NodeAddress::new("10.0.0.2", 16127))
        );
        assert_eq!(serving_node_from_cookies(["session=abc123"]), None);
        assert_eq!(serving_node_from_cookies(["weird=a:b"]), None);
    }

    #[tokio::test]
    async fn test_detect_serving_node() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("set-cookie", "FDMSERVERID=10.0.0.5:16137; Path=/"),
            )
            .mount(&server)
            .await;

        let node = detect_serving_node(&reqwest::Client::new(), &server.uri())
            .await
            .unwrap();
        assert_eq!(node, Some(NodeAddress::new("10.0.0.5", 16137)));
    }

    #[tokio::test]
    async fn test_missing_cookie_is_unknown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let node = detect_serving_node(&reqwest::Client::new(), &server.uri())
            .await
            .unwrap();
        assert_eq!(node, None);
    }
}
