//! Controlled-input forms.
//!
//! A form is a flat record of string fields. Submission is gated on every
//! required field having non-blank content; no per-field messages are given.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::models::{LoginRequest, NewProject, Route, SaveTestEntry, SignupRequest, TestBody};

pub trait Form {
    /// Names and current values of the fields that must be filled in.
    fn required(&self) -> Vec<(&'static str, &str)>;

    /// Controlled-input update by field name.
    fn set_field(&mut self, name: &str, value: &str) -> Result<()>;

    fn is_valid(&self) -> bool {
        self.required().iter().all(|(_, v)| !v.trim().is_empty())
    }

    fn ensure_valid(&self) -> Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(ClientError::LocalValidation("fill in all required fields".into()))
        }
    }
}

fn unknown_field(name: &str) -> ClientError {
    ClientError::LocalValidation(format!("unknown field '{}'", name))
}

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl Form for LoginForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![("email", self.email.as_str()), ("password", self.password.as_str())]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "email" => self.email = value.to_string(),
            "password" => self.password = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

impl LoginForm {
    pub fn payload(&self) -> Result<LoginRequest> {
        self.ensure_valid()?;
        Ok(LoginRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl Form for RegisterForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("username", self.username.as_str()),
            ("email", self.email.as_str()),
            ("password", self.password.as_str()),
        ]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "username" => self.username = value.to_string(),
            "email" => self.email = value.to_string(),
            "password" => self.password = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

impl RegisterForm {
    pub fn payload(&self) -> Result<SignupRequest> {
        self.ensure_valid()?;
        Ok(SignupRequest {
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProjectForm {
    pub project_name: String,
    pub business_logic: String,
    pub project_url: String,
}

impl Form for ProjectForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("projectName", self.project_name.as_str()),
            ("businessLogic", self.business_logic.as_str()),
            ("projectUrl", self.project_url.as_str()),
        ]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "projectName" => self.project_name = value.to_string(),
            "businessLogic" => self.business_logic = value.to_string(),
            "projectUrl" => self.project_url = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

impl ProjectForm {
    pub fn payload(&self) -> Result<NewProject> {
        self.ensure_valid()?;
        Ok(NewProject {
            project_name: self.project_name.clone(),
            business_logic: self.business_logic.clone(),
            project_url: self.project_url.clone(),
        })
    }
}

/// Inputs of the AI test generation page.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateTestsForm {
    pub api_url: String,
    pub request_format: String,
    pub business_logic: String,
    /// Optional example test case to steer generation.
    pub test_case: String,
}

impl Form for GenerateTestsForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("apiUrl", self.api_url.as_str()),
            ("requestFormat", self.request_format.as_str()),
            ("businessLogic", self.business_logic.as_str()),
        ]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "apiUrl" => self.api_url = value.to_string(),
            "requestFormat" => self.request_format = value.to_string(),
            "businessLogic" => self.business_logic = value.to_string(),
            "testCase" => self.test_case = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }
}

impl GenerateTestsForm {
    /// The whole form stringified, as the generation endpoint expects.
    pub fn prompt(&self) -> Result<String> {
        self.ensure_valid()?;
        Ok(serde_json::to_string(self)?)
    }
}

/// Manual test entry: a name, request JSON, expected response JSON and the
/// route the test belongs to.
#[derive(Debug, Clone, Default)]
pub struct ManualTestForm {
    pub test_name: String,
    pub request_body: String,
    pub response_body: String,
    pub route: Option<Route>,
}

impl Form for ManualTestForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![
            ("testName", self.test_name.as_str()),
            ("requestBody", self.request_body.as_str()),
            ("responseBody", self.response_body.as_str()),
        ]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        match name {
            "testName" => self.test_name = value.to_string(),
            "requestBody" => self.request_body = value.to_string(),
            "responseBody" => self.response_body = value.to_string(),
            other => return Err(unknown_field(other)),
        }
        Ok(())
    }

    fn is_valid(&self) -> bool {
        self.route.is_some() && self.required().iter().all(|(_, v)| !v.trim().is_empty())
    }
}

impl ManualTestForm {
    /// Assemble the entry for `/api/save-tests`.
    ///
    /// Request JSON may carry `method`, `headers`, `body`; response JSON may
    /// carry `status` and `body` (otherwise the whole document is the
    /// expected body).
    pub fn entry(&self) -> Result<SaveTestEntry> {
        let route = match (&self.route, self.is_valid()) {
            (Some(route), true) => route,
            _ => {
                return Err(ClientError::LocalValidation(
                    "fill all fields and select a route".into(),
                ))
            }
        };
        let invalid = || ClientError::LocalValidation("invalid JSON in request or response body".into());
        let request: Value = serde_json::from_str(&self.request_body).map_err(|_| invalid())?;
        let response: Value = serde_json::from_str(&self.response_body).map_err(|_| invalid())?;

        let field = |doc: &Value, key: &str| doc.get(key).filter(|v| !is_falsy(v)).cloned();
        let body = TestBody {
            test_name: self.test_name.clone(),
            request_method: field(&request, "method")
                .and_then(|v| v.as_str().map(str::to_string))
                .unwrap_or_else(|| "GET".to_string()),
            request_headers: field(&request, "headers").unwrap_or_else(|| Value::Object(Default::default())),
            request_body: field(&request, "body").unwrap_or_else(|| Value::Object(Default::default())),
            expected_status_code: field(&response, "status")
                .and_then(|v| v.as_u64())
                .and_then(|s| u16::try_from(s).ok())
                .unwrap_or(200),
            expected_response_body: field(&response, "body").unwrap_or_else(|| response.clone()),
        };
        Ok(SaveTestEntry {
            route: route.routename.clone(),
            method: route.method.clone(),
            body,
        })
    }
}

fn is_falsy(v: &Value) -> bool {
    match v {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountField {
    Username,
    Email,
    Password,
}

impl AccountField {
    pub fn name(&self) -> &'static str {
        match self {
            AccountField::Username => "username",
            AccountField::Email => "email",
            AccountField::Password => "password",
        }
    }
}

/// The single-input modal of the account settings page.
#[derive(Debug, Clone)]
pub struct AccountEditForm {
    pub field: AccountField,
    pub value: String,
}

impl Form for AccountEditForm {
    fn required(&self) -> Vec<(&'static str, &str)> {
        vec![(self.field.name(), self.value.as_str())]
    }

    fn set_field(&mut self, name: &str, value: &str) -> Result<()> {
        if name != self.field.name() {
            return Err(unknown_field(name));
        }
        self.value = value.to_string();
        Ok(())
    }
}

/// Parse the JSON pasted into a test edit modal. The object is kept as
/// written, unknown keys included.
pub fn parse_test_json(text: &str) -> Result<Value> {
    let value: Value = serde_json::from_str(text)
        .map_err(|_| ClientError::LocalValidation("JSON invalid, fix it before saving".into()))?;
    if !value.is_object() {
        return Err(ClientError::LocalValidation("test must be a JSON object".into()));
    }
    Ok(value)
}
