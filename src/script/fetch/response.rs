//! Response objects handed to scripts

use super::Headers;
use crate::value::Value;
use std::cell::RefCell;
use std::rc::Rc;

/// A completed response as it leaves the network task
#[derive(Debug, Clone, Default)]
pub struct ResponseData {
    pub status: u16,
    pub status_text: String,
    pub headers: Headers,
    pub url: String,
    pub redirected: bool,
    pub body: Vec<u8>,
}

#[derive(Debug)]
struct Inner {
    data: ResponseData,
    body_used: bool,
}

/// Script-side response with a one-shot body
#[derive(Debug, Clone)]
pub struct Response(Rc<RefCell<Inner>>);

pub const BODY_USED: &str = "body already used";

impl Response {
    pub fn new(data: ResponseData) -> Self {
        Response(Rc::new(RefCell::new(Inner {
            data,
            body_used: false,
        })))
    }

    pub fn status(&self) -> u16 {
        self.0.borrow().data.status
    }

    pub fn status_text(&self) -> String {
        self.0.borrow().data.status_text.clone()
    }

    /// Status in the 2xx range
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status())
    }

    pub fn headers(&self) -> Headers {
        self.0.borrow().data.headers.clone()
    }

    pub fn url(&self) -> String {
        self.0.borrow().data.url.clone()
    }

    pub fn redirected(&self) -> bool {
        self.0.borrow().data.redirected
    }

    pub fn body_used(&self) -> bool {
        self.0.borrow().body_used
    }

    fn take_body(&self) -> Result<Vec<u8>, String> {
        let mut inner = self.0.borrow_mut();
        if inner.body_used {
            return Err(BODY_USED.to_string());
        }
        inner.body_used = true;
        Ok(std::mem::take(&mut inner.data.body))
    }

    /// Consume the body as UTF-8 text
    pub fn text(&self) -> Result<String, String> {
        self.take_body()
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Consume the body as JSON
    pub fn json(&self) -> Result<Value, String> {
        let bytes = self.take_body()?;
        serde_json::from_slice::<serde_json::Value>(&bytes)
            .map(Value::from)
            .map_err(|e| format!("invalid JSON body: {}", e))
    }

    /// Duplicate the response with its own copy of the body
    pub fn try_clone(&self) -> Result<Response, String> {
        let inner = self.0.borrow();
        if inner.body_used {
            return Err(BODY_USED.to_string());
        }
        Ok(Response::new(inner.data.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(body: &str) -> Response {
        Response::new(ResponseData {
            status: 200,
            status_text: "OK".into(),
            url: "https://example.com/".into(),
            body: body.as_bytes().to_vec(),
            ..Default::default()
        })
    }

    #[test]
    fn test_body_is_one_shot() {
        let r = response("hello");
        assert!(r.ok());
        assert_eq!(r.text().unwrap(), "hello");
        assert!(r.body_used());
        assert_eq!(r.text().unwrap_err(), BODY_USED);
        assert_eq!(r.json().unwrap_err(), BODY_USED);
    }

    #[test]
    fn test_clone_is_isolated() {
        let original = response(r#"{"a": 1}"#);
        let copy = original.try_clone().unwrap();
        assert_eq!(copy.json().unwrap().get("a").and_then(Value::as_i64), Some(1));
        assert!(copy.body_used());
        assert!(!original.body_used());
        assert_eq!(original.text().unwrap(), r#"{"a": 1}"#);
        assert!(original.try_clone().is_err());
    }

    #[test]
    fn test_json_error() {
        let r = response("not json");
        assert!(r.json().unwrap_err().starts_with("invalid JSON body"));
    }

    #[test]
    fn test_status_range() {
        let r = Response::new(ResponseData {
            status: 404,
            ..Default::default()
        });
        assert!(!r.ok());
        assert_eq!(r.status(), 404);
    }
}
