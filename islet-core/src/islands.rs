//! Island hydration state.
//!
//! A render pass records each interactive component it instantiates with
//! [`IslandRecorder::record`]. The recorded entries are serialized into a
//! single ordered `[[componentId, props], ...]` array embedded in the page:
//!
//! ```html
//! <script id="__ISLET_STATE__" type="application/json">[["Counter",{"start":3}]]</script>
//! <script type="module" src="/_islet/hydrate.js?__islet_c=..."></script>
//! ```
//!
//! The state element is emitted on every page, even with no islands. The
//! bootstrap module is only loaded when at least one island rendered.

use crate::fingerprint::{fingerprint_url, BuildFingerprint};
use crate::Error;
use serde::ser;
use serde::Serialize;
use serde_json::Value;

/// Id of the element holding the hydration state.
pub const HYDRATION_STATE_ID: &str = "__ISLET_STATE__";

/// Client bootstrap served from the reserved hydration script path.
pub const HYDRATION_BOOTSTRAP: &str = r#"// islet hydration bootstrap
const state = JSON.parse(document.getElementById("__ISLET_STATE__")?.textContent ?? "[]");
const registry = globalThis.__ISLET_ISLANDS__ ?? {};

function locate(index) {
  const open = `islet:${index}:`;
  const close = `/islet:${index}`;
  const walker = document.createTreeWalker(document.body, NodeFilter.SHOW_COMMENT);
  let start = null;
  while (walker.nextNode()) {
    const node = walker.currentNode;
    if (start === null && node.data.startsWith(open)) start = node;
    else if (start !== null && node.data === close) return [start, node];
  }
  return null;
}

state.forEach(([id, props], index) => {
  const hydrate = registry[id];
  const range = locate(index);
  if (typeof hydrate === "function" && range !== null) {
    hydrate(range[0], range[1], props);
  }
});
"#;

/// One interactive component instance, in render order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HydrationEntry {
    pub component_id: String,
    pub props: Value,
    pub index: usize,
}

/// Collects islands during a single render pass.
#[derive(Debug, Default)]
pub struct IslandRecorder {
    entries: Vec<HydrationEntry>,
}

impl IslandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an island and return its render-order index.
    ///
    /// Fails with [`Error::Serialization`] when `props` has no JSON form
    /// (a map with non-string keys, a NaN or infinite float), so corrupt
    /// state is never emitted.
    pub fn record<T: Serialize + ?Sized>(
        &mut self,
        component_id: &str,
        props: &T,
    ) -> Result<usize, Error> {
        if component_id.is_empty() || component_id.contains("--") || component_id.contains('>') {
            return Err(Error::Serialization(format!(
                "invalid island component id {:?}",
                component_id
            )));
        }

        let props = props
            .serialize(&mut FiniteCheck)
            .and_then(|()| serde_json::to_value(props))
            .map_err(|err| {
                Error::Serialization(format!(
                    "props of island {:?} cannot be serialized: {}",
                    component_id, err
                ))
            })?;

        let index = self.entries.len();
        self.entries.push(HydrationEntry {
            component_id: component_id.to_string(),
            props,
            index,
        });
        Ok(index)
    }

    /// Surround an island's markup with the markers the client looks for.
    pub fn wrap(&self, index: usize, html: &str) -> String {
        let id = self
            .entries
            .get(index)
            .map(|e| e.component_id.as_str())
            .unwrap_or_default();
        format!("<!--islet:{}:{}-->{}<!--/islet:{}-->", index, id, html, index)
    }

    /// Record an island and wrap its markup in one step.
    pub fn island<T: Serialize + ?Sized>(
        &mut self,
        component_id: &str,
        props: &T,
        html: &str,
    ) -> Result<String, Error> {
        let index = self.record(component_id, props)?;
        Ok(self.wrap(index, html))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_entries(self) -> Vec<HydrationEntry> {
        self.entries
    }
}

/// Serialized hydration state for one response.
#[derive(Debug, Clone)]
pub struct HydrationPayload<'a> {
    entries: &'a [HydrationEntry],
}

impl<'a> HydrationPayload<'a> {
    pub fn new(entries: &'a [HydrationEntry]) -> Self {
        Self { entries }
    }

    /// `[[id, props], ...]`, escaped for embedding inside a `<script>`.
    pub fn to_json(&self) -> Result<String, Error> {
        let pairs: Vec<(&str, &Value)> = self
            .entries
            .iter()
            .map(|e| (e.component_id.as_str(), &e.props))
            .collect();
        let json = serde_json::to_string(&pairs)?;
        Ok(escape_script_json(&json))
    }

    /// The state element, plus the bootstrap module when any island exists.
    pub fn script_tags(
        &self,
        hydration_path: &str,
        fingerprint: &BuildFingerprint,
    ) -> Result<String, Error> {
        let mut tags = format!(
            r#"<script id="{}" type="application/json">{}</script>"#,
            HYDRATION_STATE_ID,
            self.to_json()?
        );
        if !self.entries.is_empty() {
            tags.push_str(&format!(
                r#"<script type="module" src="{}"></script>"#,
                fingerprint_url(hydration_path, fingerprint)
            ));
        }
        Ok(tags)
    }
}

/// Walks a value looking for floats JSON cannot carry.
///
/// `serde_json` writes NaN and the infinities as `null`, which would
/// silently hand the client different props than the server rendered with.
struct FiniteCheck;

type Check = Result<(), serde_json::Error>;

impl<'a> ser::Serializer for &'a mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;
    type SerializeSeq = Self;
    type SerializeTuple = Self;
    type SerializeTupleStruct = Self;
    type SerializeTupleVariant = Self;
    type SerializeMap = Self;
    type SerializeStruct = Self;
    type SerializeStructVariant = Self;

    fn serialize_bool(self, _: bool) -> Check {
        Ok(())
    }
    fn serialize_i8(self, _: i8) -> Check {
        Ok(())
    }
    fn serialize_i16(self, _: i16) -> Check {
        Ok(())
    }
    fn serialize_i32(self, _: i32) -> Check {
        Ok(())
    }
    fn serialize_i64(self, _: i64) -> Check {
        Ok(())
    }
    fn serialize_i128(self, _: i128) -> Check {
        Ok(())
    }
    fn serialize_u8(self, _: u8) -> Check {
        Ok(())
    }
    fn serialize_u16(self, _: u16) -> Check {
        Ok(())
    }
    fn serialize_u32(self, _: u32) -> Check {
        Ok(())
    }
    fn serialize_u64(self, _: u64) -> Check {
        Ok(())
    }
    fn serialize_u128(self, _: u128) -> Check {
        Ok(())
    }

    fn serialize_f32(self, v: f32) -> Check {
        ser::Serializer::serialize_f64(self, f64::from(v))
    }

    fn serialize_f64(self, v: f64) -> Check {
        if v.is_finite() {
            Ok(())
        } else {
            Err(ser::Error::custom(format!("{} has no JSON representation", v)))
        }
    }

    fn serialize_char(self, _: char) -> Check {
        Ok(())
    }
    fn serialize_str(self, _: &str) -> Check {
        Ok(())
    }
    fn serialize_bytes(self, _: &[u8]) -> Check {
        Ok(())
    }
    fn serialize_none(self) -> Check {
        Ok(())
    }

    fn serialize_some<T: ?Sized + Serialize>(self, value: &T) -> Check {
        value.serialize(self)
    }

    fn serialize_unit(self) -> Check {
        Ok(())
    }
    fn serialize_unit_struct(self, _: &'static str) -> Check {
        Ok(())
    }
    fn serialize_unit_variant(self, _: &'static str, _: u32, _: &'static str) -> Check {
        Ok(())
    }

    fn serialize_newtype_struct<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_newtype_variant<T: ?Sized + Serialize>(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        value: &T,
    ) -> Check {
        value.serialize(self)
    }

    fn serialize_seq(self, _: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple(self, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_struct(self, _: &'static str, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_tuple_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_map(self, _: Option<usize>) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct(self, _: &'static str, _: usize) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
    fn serialize_struct_variant(
        self,
        _: &'static str,
        _: u32,
        _: &'static str,
        _: usize,
    ) -> Result<Self, serde_json::Error> {
        Ok(self)
    }
}

impl ser::SerializeSeq for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTuple for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_element<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleStruct for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeTupleVariant for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeMap for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_key<T: ?Sized + Serialize>(&mut self, key: &T) -> Check {
        key.serialize(&mut **self)
    }
    fn serialize_value<T: ?Sized + Serialize>(&mut self, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStruct for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

impl ser::SerializeStructVariant for &mut FiniteCheck {
    type Ok = ();
    type Error = serde_json::Error;

    fn serialize_field<T: ?Sized + Serialize>(&mut self, _: &'static str, value: &T) -> Check {
        value.serialize(&mut **self)
    }
    fn end(self) -> Check {
        Ok(())
    }
}

fn escape_script_json(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    for c in json.chars() {
        match c {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}
