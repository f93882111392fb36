use serde::{
  Deserialize,
  Serialize,
};
use serde_json::{
  Map,
  Value,
};

const MAX_HEADING_LEVEL: usize = 6;
const MAX_INDENT: usize = 80;

/// Output of the component layer: plain text or a typed element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VNode {
  Text(String),
  Element {
    #[serde(rename = "type")]
    kind:     String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    props:    Map<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    children: Vec<VNode>,
  },
}

impl VNode {
  pub fn text(text: impl Into<String>) -> Self {
    Self::Text(text.into())
  }

  pub fn element(kind: impl Into<String>) -> Self {
    Self::Element {
      kind:     kind.into(),
      props:    Map::new(),
      children: Vec::new(),
    }
  }

  /// Builder: set a prop. No-op on text leaves.
  pub fn prop(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    if let Self::Element { props, .. } = &mut self {
      props.insert(key.into(), value.into());
    }
    self
  }

  /// Builder: append a child. No-op on text leaves.
  pub fn child(mut self, node: VNode) -> Self {
    if let Self::Element { children, .. } = &mut self {
      children.push(node);
    }
    self
  }
}

impl From<&str> for VNode {
  fn from(text: &str) -> Self {
    Self::text(text)
  }
}

impl From<String> for VNode {
  fn from(text: String) -> Self {
    Self::Text(text)
  }
}

/// Render `node` to buffer lines.
///
/// Text leaves are one line each. Elements concatenate their children's
/// lines and then apply the transform for their type; unknown types pass the
/// children through unchanged.
pub fn render_vnode(node: &VNode) -> Vec<String> {
  match node {
    VNode::Text(text) => vec![text.clone()],
    VNode::Element {
      kind,
      props,
      children,
    } => {
      let lines: Vec<String> = children.iter().flat_map(render_vnode).collect();
      transform(kind, props, lines)
    },
  }
}

fn transform(kind: &str, props: &Map<String, Value>, lines: Vec<String>) -> Vec<String> {
  match kind {
    "bold" => wrap(lines, "**"),
    "italic" => wrap(lines, "_"),
    "code" => wrap(lines, "`"),
    "heading" => {
      let level = usize_prop(props, "level").unwrap_or(1);
      let marker = "#".repeat(level.clamp(1, MAX_HEADING_LEVEL));
      lines
        .into_iter()
        .map(|line| format!("{marker} {line}"))
        .collect()
    },
    "li" => {
      lines
        .into_iter()
        .enumerate()
        .map(|(idx, line)| {
          if idx == 0 {
            format!("- {line}")
          } else {
            format!("  {line}")
          }
        })
        .collect()
    },
    "indent" => {
      let width = usize_prop(props, "width").unwrap_or(2);
      let pad = " ".repeat(width.min(MAX_INDENT));
      lines.into_iter().map(|line| format!("{pad}{line}")).collect()
    },
    _ => lines,
  }
}

fn wrap(lines: Vec<String>, marker: &str) -> Vec<String> {
  lines
    .into_iter()
    .map(|line| format!("{marker}{line}{marker}"))
    .collect()
}

fn usize_prop(props: &Map<String, Value>, key: &str) -> Option<usize> {
  props
    .get(key)?
    .as_u64()
    .map(|value| usize::try_from(value).unwrap_or(usize::MAX))
}
