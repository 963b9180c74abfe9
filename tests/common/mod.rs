use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::StatusCode;
use serde_json::{json, Value};

/// A server process on its own port, backed by the in-memory store.
/// Killed when dropped so every test starts from empty tables.
pub struct TestServer {
    pub base_url: String,
    child: Child,
}

impl TestServer {
    pub async fn start() -> Result<Self> {
        let port = portpicker::pick_unused_port().context("failed to pick free port")?;
        let base_url = format!("http://127.0.0.1:{}", port);

        let child = Command::new(env!("CARGO_BIN_EXE_garderie-api"))
            .arg("serve")
            .env("APP_ENV", "development")
            .env("GARDERIE_STORE", "memory")
            .env("GARDERIE_API_PORT", port.to_string())
            .env("SECURITY_REQUIRE_AUTH", "false")
            .env("RUST_LOG", "garderie_api=warn")
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .spawn()
            .context("failed to spawn server binary")?;

        let server = Self { base_url, child };
        server.wait_ready(Duration::from_secs(10)).await?;
        Ok(server)
    }

    async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let client = reqwest::Client::new();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if let Ok(resp) = client.get(self.url("/health")).send().await {
                if resp.status() == StatusCode::OK {
                    return Ok(());
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        anyhow::bail!("server did not become ready on {} within {:?}", self.base_url, timeout)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Open a facility and return its id
    pub async fn open_facility(&self, client: &reqwest::Client, places: i32, available: i32) -> Result<i64> {
        let res = client
            .post(self.url("/api/garderies"))
            .json(&json!({
                "nom": "Les Petits Loups",
                "adresse": "12 rue des Lilas",
                "tarif": "45.50",
                "disponibilite": available,
                "nombre_places": places,
                "description": "Garderie de quartier",
                "directeur_id": 1
            }))
            .send()
            .await?;
        anyhow::ensure!(res.status() == StatusCode::CREATED, "facility creation failed: {}", res.status());
        let body = res.json::<Value>().await?;
        body["idgarderie"].as_i64().context("missing idgarderie")
    }

    pub async fn facility(&self, client: &reqwest::Client, id: i64) -> Result<Value> {
        Ok(client
            .get(self.url(&format!("/api/garderies/{id}")))
            .send()
            .await?
            .json::<Value>()
            .await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
