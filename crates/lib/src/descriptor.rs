//! Element tree for moduleset descriptor documents.
//!
//! Descriptors are small element-and-attribute documents. They are read into
//! a plain [`Element`] tree so the moduleset loader and the module-type
//! parsers never deal with the XML reader directly, and written back out for
//! serialization.

use std::path::{Path, PathBuf};

use quick_xml::Reader;
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DescriptorError {
  #[error("failed to read {path}: {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("malformed document at byte {position}: {message}")]
  Parse { position: u64, message: String },

  #[error("document has no root element")]
  Empty,

  #[error("<{element}> attribute '{attr}' must be a boolean, got '{value}'")]
  InvalidBool {
    element: String,
    attr: String,
    value: String,
  },

  #[error("<{element}> is missing required attribute '{attr}'")]
  MissingAttr { element: String, attr: String },

  #[error("failed to write document: {0}")]
  Write(String),
}

/// One element with its attributes in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Element {
  pub name: String,
  pub attributes: Vec<(String, String)>,
  pub children: Vec<Element>,
  pub text: String,
}

impl Element {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      ..Default::default()
    }
  }

  pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.set_attr(key, value);
    self
  }

  pub fn with_child(mut self, child: Element) -> Self {
    self.children.push(child);
    self
  }

  pub fn with_text(mut self, text: impl Into<String>) -> Self {
    self.text = text.into();
    self
  }

  pub fn attr(&self, key: &str) -> Option<&str> {
    self
      .attributes
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }

  pub fn required_attr(&self, key: &str) -> Result<&str, DescriptorError> {
    self.attr(key).ok_or_else(|| DescriptorError::MissingAttr {
      element: self.name.clone(),
      attr: key.to_string(),
    })
  }

  /// Sets `key`, replacing an existing value in place.
  pub fn set_attr(&mut self, key: impl Into<String>, value: impl Into<String>) {
    let key = key.into();
    let value = value.into();
    match self.attributes.iter_mut().find(|(k, _)| *k == key) {
      Some(slot) => slot.1 = value,
      None => self.attributes.push((key, value)),
    }
  }

  /// Reads a `yes`/`no` (or `true`/`false`) attribute.
  pub fn bool_attr(&self, key: &str, default: bool) -> Result<bool, DescriptorError> {
    match self.attr(key) {
      None => Ok(default),
      Some(v) => parse_bool(v).ok_or_else(|| DescriptorError::InvalidBool {
        element: self.name.clone(),
        attr: key.to_string(),
        value: v.to_string(),
      }),
    }
  }

  pub fn child(&self, name: &str) -> Option<&Element> {
    self.children.iter().find(|c| c.name == name)
  }

  pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
    self.children.iter().filter(move |c| c.name == name)
  }
}

fn parse_bool(value: &str) -> Option<bool> {
  match value.trim().to_ascii_lowercase().as_str() {
    "yes" | "true" | "1" => Some(true),
    "no" | "false" | "0" => Some(false),
    _ => None,
  }
}

pub fn format_bool(value: bool) -> &'static str {
  if value { "yes" } else { "no" }
}

/// Reads and parses the document at `path`.
pub fn parse_file(path: &Path) -> Result<Element, DescriptorError> {
  let text = std::fs::read_to_string(path).map_err(|source| DescriptorError::Read {
    path: path.to_path_buf(),
    source,
  })?;
  parse_str(&text)
}

/// Parses a document and returns its root element.
pub fn parse_str(text: &str) -> Result<Element, DescriptorError> {
  let mut reader = Reader::from_str(text);
  reader.config_mut().trim_text(true);

  let parse_err = |reader: &Reader<&[u8]>, message: String| DescriptorError::Parse {
    position: reader.buffer_position(),
    message,
  };

  let mut stack: Vec<Element> = Vec::new();
  let mut root: Option<Element> = None;

  loop {
    let event = reader.read_event().map_err(|e| parse_err(&reader, e.to_string()))?;
    match event {
      Event::Start(start) => {
        let element = start_element(&start).map_err(|m| parse_err(&reader, m))?;
        stack.push(element);
      }
      Event::Empty(start) => {
        let element = start_element(&start).map_err(|m| parse_err(&reader, m))?;
        attach(&mut stack, &mut root, element).map_err(|m| parse_err(&reader, m))?;
      }
      Event::End(_) => {
        let element = stack
          .pop()
          .ok_or_else(|| parse_err(&reader, "unbalanced end tag".to_string()))?;
        attach(&mut stack, &mut root, element).map_err(|m| parse_err(&reader, m))?;
      }
      Event::Text(text) => {
        let value = text.unescape().map_err(|e| parse_err(&reader, e.to_string()))?;
        if let Some(current) = stack.last_mut() {
          current.text.push_str(&value);
        }
      }
      Event::CData(data) => {
        if let Some(current) = stack.last_mut() {
          current.text.push_str(&String::from_utf8_lossy(&data));
        }
      }
      Event::Eof => break,
      _ => {}
    }
  }

  if !stack.is_empty() {
    return Err(parse_err(&reader, format!("unclosed element <{}>", stack[stack.len() - 1].name)));
  }
  root.ok_or(DescriptorError::Empty)
}

fn start_element(start: &BytesStart<'_>) -> Result<Element, String> {
  let mut element = Element::new(String::from_utf8_lossy(start.name().as_ref()).into_owned());
  for attr in start.attributes() {
    let attr = attr.map_err(|e| e.to_string())?;
    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
    let value = attr.unescape_value().map_err(|e| e.to_string())?.into_owned();
    element.attributes.push((key, value));
  }
  Ok(element)
}

fn attach(stack: &mut [Element], root: &mut Option<Element>, element: Element) -> Result<(), String> {
  match stack.last_mut() {
    Some(parent) => {
      parent.children.push(element);
      Ok(())
    }
    None if root.is_none() => {
      *root = Some(element);
      Ok(())
    }
    None => Err(format!("unexpected second root element <{}>", element.name)),
  }
}

/// Serializes `root` as an indented document with an XML declaration.
pub fn to_string(root: &Element) -> Result<String, DescriptorError> {
  let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
  writer
    .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
    .map_err(|e| DescriptorError::Write(e.to_string()))?;
  write_element(&mut writer, root)?;
  let mut out = String::from_utf8(writer.into_inner()).map_err(|e| DescriptorError::Write(e.to_string()))?;
  out.push('\n');
  Ok(out)
}

fn write_element(writer: &mut Writer<Vec<u8>>, element: &Element) -> Result<(), DescriptorError> {
  let mut start = BytesStart::new(element.name.as_str());
  for (key, value) in &element.attributes {
    start.push_attribute((key.as_str(), value.as_str()));
  }

  if element.children.is_empty() && element.text.is_empty() {
    return writer
      .write_event(Event::Empty(start))
      .map_err(|e| DescriptorError::Write(e.to_string()));
  }

  writer
    .write_event(Event::Start(start))
    .map_err(|e| DescriptorError::Write(e.to_string()))?;
  if !element.text.is_empty() {
    writer
      .write_event(Event::Text(BytesText::new(&element.text)))
      .map_err(|e| DescriptorError::Write(e.to_string()))?;
  }
  for child in &element.children {
    write_element(writer, child)?;
  }
  writer
    .write_event(Event::End(BytesEnd::new(element.name.as_str())))
    .map_err(|e| DescriptorError::Write(e.to_string()))
}
