//! Request descriptors: what a call means, before it is put on the wire.
//!
//! A descriptor carries the semantic method. Multipart bodies cannot ride on
//! PUT/PATCH/DELETE with the backends we talk to, so `into_transport` sends
//! those as POST and adds a `_method` form field naming the real verb.

use reqwest::Method;
use serde_json::Value;

use crate::models::ImageUpload;

/// Form field carrying the semantic method of a tunneled multipart request
pub const METHOD_OVERRIDE_FIELD: &str = "_method";

/// Body encoding of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Multipart,
}

impl ContentKind {
    pub fn mime(&self) -> &'static str {
        match self {
            ContentKind::Json => "application/json",
            ContentKind::Multipart => "multipart/form-data",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    File(ImageUpload),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub value: FieldValue,
}

/// Ordered multipart fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormFields(Vec<FormField>);

impl FormFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.push(FormField {
            name: name.into(),
            value: FieldValue::Text(value.into()),
        });
        self
    }

    pub fn file(mut self, name: impl Into<String>, image: ImageUpload) -> Self {
        self.0.push(FormField {
            name: name.into(),
            value: FieldValue::File(image),
        });
        self
    }

    pub fn names(&self) -> Vec<&str> {
        self.0.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn get_text(&self, name: &str) -> Option<&str> {
        self.0.iter().find_map(|f| match &f.value {
            FieldValue::Text(v) if f.name == name => Some(v.as_str()),
            _ => None,
        })
    }

    fn prepend_text(&mut self, name: &str, value: &str) {
        self.0.insert(
            0,
            FormField {
                name: name.to_string(),
                value: FieldValue::Text(value.to_string()),
            },
        );
    }
}

impl IntoIterator for FormFields {
    type Item = FormField;
    type IntoIter = std::vec::IntoIter<FormField>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(Value),
    Multipart(FormFields),
}

/// An outbound call as the caller means it.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path relative to the API base, e.g. `posts/3`
    pub path: String,
    pub payload: Payload,
}

impl RequestDescriptor {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            payload: Payload::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.payload = Payload::Json(body);
        self
    }

    pub fn multipart(mut self, fields: FormFields) -> Self {
        self.payload = Payload::Multipart(fields);
        self
    }

    pub fn content_kind(&self) -> Option<ContentKind> {
        match self.payload {
            Payload::Empty => None,
            Payload::Json(_) => Some(ContentKind::Json),
            Payload::Multipart(_) => Some(ContentKind::Multipart),
        }
    }

    /// The verb actually sent.
    pub fn transport_method(&self) -> Method {
        if self.method_override().is_some() {
            Method::POST
        } else {
            self.method.clone()
        }
    }

    /// The `_method` value, for multipart calls that cannot use their own verb.
    pub fn method_override(&self) -> Option<&str> {
        let tunneled = self.method == Method::PUT
            || self.method == Method::PATCH
            || self.method == Method::DELETE;
        match self.payload {
            Payload::Multipart(_) if tunneled => Some(self.method.as_str()),
            _ => None,
        }
    }

    /// Resolve into the wire form: transport verb plus a body with any override field.
    pub fn into_transport(self) -> TransportRequest {
        let method = self.transport_method();
        let override_value = self.method_override().map(str::to_string);
        let payload = match self.payload {
            Payload::Multipart(mut fields) => {
                if let Some(value) = override_value {
                    fields.prepend_text(METHOD_OVERRIDE_FIELD, &value);
                }
                Payload::Multipart(fields)
            }
            other => other,
        };
        TransportRequest {
            method,
            path: self.path,
            payload,
        }
    }
}

/// A descriptor after method tunneling, ready for the HTTP layer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub payload: Payload,
}
