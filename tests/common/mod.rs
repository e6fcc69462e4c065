#![allow(dead_code)]

use cnpjscraper::fetch::{RegistryApi, RegistryResponse, RetryReason, Sleep};
use cnpjscraper::Cnpj;
use serde_json::json;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub fn init_test_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cnpjscraper=debug")),
        )
        .with_test_writer()
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

pub type Outcome = Result<RegistryResponse, RetryReason>;

/// In-memory registry: scripted outcomes per CNPJ, then a canned OK answer.
#[derive(Default)]
pub struct FakeRegistry {
    scripts: Mutex<HashMap<String, VecDeque<Outcome>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    pub fn script(self, cnpj: &str, outcomes: Vec<Outcome>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .insert(cnpj.to_string(), outcomes.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl RegistryApi for FakeRegistry {
    fn fetch(&self, cnpj: &Cnpj) -> Outcome {
        self.calls.lock().unwrap().push(cnpj.to_string());
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(cnpj.as_str())
            .and_then(|q| q.pop_front());
        scripted.unwrap_or_else(|| {
            Ok(serde_json::from_value(json!({
                "status": "OK",
                "nome": format!("EMPRESA {}", &cnpj.as_str()[..8]),
                "simples": { "optante": true },
                "simei": { "optante": false }
            }))
            .unwrap())
        })
    }
}

/// Records requested sleeps instead of sleeping.
#[derive(Default)]
pub struct Recorder(Mutex<Vec<Duration>>);

impl Sleep for Recorder {
    fn sleep(&self, dur: Duration) {
        self.0.lock().unwrap().push(dur);
    }
}

impl Recorder {
    pub fn secs(&self) -> Vec<u64> {
        self.0.lock().unwrap().iter().map(|d| d.as_secs()).collect()
    }
}
