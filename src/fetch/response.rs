// src/fetch/response.rs

use serde::Deserialize;
use serde_json::Value;

use crate::cnpj::Cnpj;

/// `status` value the registry sends on a successful lookup.
pub const STATUS_OK: &str = "OK";

/// JSON body of `GET /v1/cnpj/{cnpj}`. Only `status` decides success; the
/// other fields stay raw JSON and an unexpected shape reads as absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegistryResponse {
    #[serde(default)]
    pub status: Option<Value>,
    #[serde(default)]
    pub message: Option<Value>,
    #[serde(default)]
    pub nome: Option<Value>,
    #[serde(default)]
    pub simples: Option<Value>,
    #[serde(default)]
    pub simei: Option<Value>,
}

impl RegistryResponse {
    pub fn status(&self) -> Option<&str> {
        self.status.as_ref().and_then(Value::as_str)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_ref().and_then(Value::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some(STATUS_OK)
    }

    /// Company name, if the registry sent one as a string.
    pub fn name(&self) -> Option<&str> {
        self.nome.as_ref().and_then(Value::as_str)
    }
}

/// `section.optante`, whatever shape `section` turned out to be.
fn optante(section: Option<&Value>) -> Option<&Value> {
    section.and_then(|s| s.get("optante"))
}

/// Tri-state opt-in flag as written to the output sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptInFlag {
    Yes,
    No,
    Unknown,
}

impl OptInFlag {
    pub fn as_str(&self) -> &'static str {
        match self {
            OptInFlag::Yes => "SIM",
            OptInFlag::No => "NÃO",
            OptInFlag::Unknown => "",
        }
    }

    /// Only a JSON boolean is an answer; null, missing or any other type is unknown.
    pub fn from_json(value: Option<&Value>) -> Self {
        match value {
            Some(Value::Bool(b)) => Self::from(Some(*b)),
            _ => OptInFlag::Unknown,
        }
    }
}

impl From<Option<bool>> for OptInFlag {
    fn from(value: Option<bool>) -> Self {
        match value {
            Some(true) => OptInFlag::Yes,
            Some(false) => OptInFlag::No,
            None => OptInFlag::Unknown,
        }
    }
}

/// One enriched company, produced per successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupResult {
    pub display_name: Option<String>,
    pub cnpj: Cnpj,
    pub simples_nacional: OptInFlag,
    pub mei: OptInFlag,
}

impl LookupResult {
    pub fn from_response(cnpj: Cnpj, body: RegistryResponse) -> Self {
        Self {
            display_name: body.name().map(str::to_string),
            cnpj,
            simples_nacional: OptInFlag::from_json(optante(body.simples.as_ref())),
            mei: OptInFlag::from_json(optante(body.simei.as_ref())),
        }
    }

    /// Cells in `nome, cnpj, simples_nacional, mei` order.
    pub fn to_row(&self) -> [String; 4] {
        [
            self.display_name.clone().unwrap_or_default(),
            self.cnpj.to_string(),
            self.simples_nacional.as_str().to_string(),
            self.mei.as_str().to_string(),
        ]
    }
}
