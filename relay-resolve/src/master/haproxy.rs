use super::{MasterReport, MasterStrategy};
use crate::get_text;
use async_trait::async_trait;
use relay_common::config::expand_template;
use relay_common::error::{RelayError, Result};
use relay_common::types::{MasterSource, NodeAddress};
use tracing::debug;

/// Reads the load balancer's CSV statistics and takes the active member of
/// the application's backend pool.
pub struct HaproxyStrategy {
    client: reqwest::Client,
    url_template: String,
}

impl HaproxyStrategy {
    pub fn new(client: reqwest::Client, url_template: &str) -> Self {
        Self {
            client,
            url_template: url_template.to_string(),
        }
    }
}

#[async_trait]
impl MasterStrategy for HaproxyStrategy {
    fn source(&self) -> MasterSource {
        MasterSource::Haproxy
    }

    async fn locate(&self, app: &str) -> Result<MasterReport> {
        let url = expand_template(&self.url_template, app);
        debug!(app = %app, url = %url, "reading load balancer statistics");
        let csv = get_text(&self.client, &url).await?;
        let master = find_active_server(&csv, app).ok_or_else(|| {
            RelayError::NoMasterDetected(format!("{} (no active backend member)", app))
        })?;

        Ok(MasterReport {
            members: vec![master.clone()],
            master,
            source: MasterSource::Haproxy,
            region: None,
        })
    }
}

struct Columns {
    pxname: usize,
    svname: usize,
    status: usize,
    act: usize,
    addr: Option<usize>,
}

impl Columns {
    fn from_header(header: &str) -> Option<Self> {
        let names: Vec<&str> = header
            .trim_start_matches('#')
            .trim()
            .split(',')
            .map(str::trim)
            .collect();
        let index = |name: &str| names.iter().position(|n| *n == name);
        Some(Self {
            pxname: index("pxname")?,
            svname: index("svname")?,
            status: index("status")?,
            act: index("act")?,
            addr: index("addr"),
        })
    }
}

/// Address of the first server row of the app's backend flagged `act=1`
/// and up.
pub fn find_active_server(csv: &str, app: &str) -> Option<String> {
    let mut lines = csv.lines().filter(|l| !l.trim().is_empty());
    let columns = Columns::from_header(lines.next()?)?;
    let app = app.to_lowercase();

    for line in lines {
        if line.starts_with('#') {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let field = |i: usize| fields.get(i).copied().unwrap_or_default();

        let svname = field(columns.svname);
        if svname == "FRONTEND" || svname == "BACKEND" {
            continue;
        }
        if !is_app_pool(field(columns.pxname), &app) {
            continue;
        }
        let status = field(columns.status);
        if field(columns.act) != "1" || !(status.starts_with("UP") || status == "no check") {
            continue;
        }

        let addr = columns.addr.map(field).unwrap_or_default();
        if !addr.is_empty() {
            return Some(addr.to_string());
        }
        if let Ok((_, Some(_))) = NodeAddress::split_port(svname) {
            return Some(svname.to_string());
        }
    }

    None
}

/// Pools are named after the app, optionally with a `backend` suffix.
fn is_app_pool(pxname: &str, app: &str) -> bool {
    let pxname = pxname.to_lowercase();
    let base = pxname.strip_suffix("backend").unwrap_or(pxname.as_str());
    base == app || pxname == app
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const STATS: &str = "\
# pxname,svname,qcur,qmax,scur,smax,status,weight,act,bck,addr
webbackend,FRONTEND,,,0,1,OPEN,,,,
webbackend,10.0.0.1:16127,0,0,0,1,UP,1,0,1,10.0.0.1:16127
webbackend,10.0.0.2:16127,0,0,0,1,UP,1,1,0,10.0.0.2:16127
webbackend,BACKEND,0,0,0,1,UP,2,1,1,
otherbackend,10.0.0.7:16127,0,0,0,1,UP,1,1,0,10.0.0.7:16127
";

    #[test]
    fn test_find_active_server() {
        assert_eq!(find_active_server(STATS, "web").as_deref(), Some("10.0.0.2:16127"));
        assert_eq!(find_active_server(STATS, "other").as_deref(), Some("10.0.0.7:16127"));
        assert_eq!(find_active_server(STATS, "missing"), None);
    }

    #[test]
    fn test_active_member_that_is_down_is_skipped() {
        let csv = "\
# pxname,svname,status,act
webbackend,10.0.0.3:16127,DOWN,1
webbackend,10.0.0.4:16137,UP 1/3,1
";
        assert_eq!(find_active_server(csv, "web").as_deref(), Some("10.0.0.4:16137"));
    }

    #[test]
    fn test_similarly_named_pools_are_ignored() {
        let csv = "\
# pxname,svname,status,act,addr
mywebshopbackend,x,UP,1,10.9.9.9:16127
web2backend,z,UP,1,10.8.8.8:16127
webbackend,y,UP,1,10.0.0.2:16127
";
        assert_eq!(find_active_server(csv, "web").as_deref(), Some("10.0.0.2:16127"));
        assert_eq!(find_active_server(csv, "Web").as_deref(), Some("10.0.0.2:16127"));
        assert_eq!(find_active_server(csv, "w"), None);
    }

    #[test]
    fn test_malformed_header() {
        assert_eq!(find_active_server("not,a,stats,report\n", "web"), None);
        assert_eq!(find_active_server("", "web"), None);
    }

    #[tokio::test]
    async fn test_locate_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string(STATS))
            .mount(&server)
            .await;

        let strategy = HaproxyStrategy::new(
            reqwest::Client::new(),
            &format!("{}/stats/{{app}}", server.uri()),
        );
        let report = strategy.locate("web").await.unwrap();
        assert_eq!(report.master, "10.0.0.2:16127");
        assert_eq!(report.members, vec!["10.0.0.2:16127"]);
        assert_eq!(report.source, MasterSource::Haproxy);
    }
}
