//! Data types flowing through the crawl pipeline.
//!
//! A [`Request`] travels from the request cache through the download stage,
//! a [`Response`] from the download stage into the analyze stage, and an
//! [`Item`] from the analyze stage into the item pipeline. Analyzers emit a
//! heterogeneous stream of requests and items, modelled by the [`Data`] sum
//! type and matched explicitly at the analyze dispatcher.

use bytes::Bytes;
use http::{Method, StatusCode};
use indexmap::IndexMap;
use serde::Serialize;
use std::borrow::Cow;
use url::Url;

/// A crawl request: an HTTP request plus its hop distance from the seed.
///
/// The seed has depth 0; every request an analyzer emits carries the depth of
/// the response it was parsed from plus one.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: Url,
    depth: u32,
}

impl Request {
    /// Creates a GET request at depth 0.
    pub fn new(url: Url) -> Self {
        Self::with_depth(url, 0)
    }

    /// Creates a GET request at the given depth.
    pub fn with_depth(url: Url, depth: u32) -> Self {
        Request {
            method: Method::GET,
            url,
            depth,
        }
    }

    /// Replaces the HTTP method.
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Returns a copy of this request pinned to a different depth.
    pub fn at_depth(&self, depth: u32) -> Self {
        Request {
            method: self.method.clone(),
            url: self.url.clone(),
            depth,
        }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// A downloaded page plus the depth of the request that produced it.
#[derive(Debug, Clone)]
pub struct Response {
    url: Url,
    status: StatusCode,
    body: Bytes,
    depth: u32,
}

impl Response {
    pub fn new(url: Url, status: StatusCode, body: Bytes, depth: u32) -> Self {
        Response {
            url,
            status,
            body,
            depth,
        }
    }

    pub(crate) fn at_depth(mut self, depth: u32) -> Self {
        self.depth = depth;
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// The body decoded as UTF-8, lossily.
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }
}

/// A scraped item: an ordered mapping of string keys to opaque values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Item(IndexMap<String, serde_json::Value>);

impl Item {
    pub fn new() -> Self {
        Item(IndexMap::new())
    }

    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Option<serde_json::Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

impl FromIterator<(String, serde_json::Value)> for Item {
    fn from_iter<I: IntoIterator<Item = (String, serde_json::Value)>>(iter: I) -> Self {
        Item(iter.into_iter().collect())
    }
}

impl IntoIterator for Item {
    type Item = (String, serde_json::Value);
    type IntoIter = indexmap::map::IntoIter<String, serde_json::Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// The tagged output of a response parser.
#[derive(Debug, Clone)]
pub enum Data {
    Request(Request),
    Item(Item),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_depth_rewrite_keeps_method_and_url() {
        let url = Url::parse("http://example.com/a").unwrap();
        let req = Request::with_depth(url.clone(), 3).with_method(Method::HEAD);
        let moved = req.at_depth(7);
        assert_eq!(moved.depth(), 7);
        assert_eq!(moved.url(), &url);
        assert_eq!(moved.method(), &Method::HEAD);
    }

    #[test]
    fn item_preserves_insertion_order() {
        let mut item = Item::new();
        item.insert("z", 1);
        item.insert("a", 2);
        item.insert("m", 3);
        let keys: Vec<&str> = item.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["z", "a", "m"]);
    }

    #[test]
    fn response_text_is_lossy() {
        let url = Url::parse("http://example.com").unwrap();
        let resp = Response::new(url, StatusCode::OK, Bytes::from_static(b"ok\xff"), 0);
        assert!(resp.text().starts_with("ok"));
    }
}
