//! Rendering of JSON values as Lua literal syntax.
//!
//! Every argument that crosses into the peer is written through
//! [`serialize_for_peer`]; nothing else in the workspace builds Lua source by
//! hand.

use std::fmt::Write as _;

use serde_json::{
  Number,
  Value,
};
use tracing::warn;

const LUA_KEYWORDS: &[&str] = &[
  "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
  "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// Render `value` as a Lua expression.
///
/// - `null` ⇒ `nil`
/// - booleans and numbers are written bare
/// - strings are double-quoted with Lua escapes
/// - arrays become sequence tables, objects become keyed tables; keys that
///   are not plain identifiers use the `["key"] = ...` form
pub fn serialize_for_peer(value: &Value) -> String {
  let mut out = String::new();
  write_value(&mut out, value);
  out
}

pub fn is_lua_identifier(name: &str) -> bool {
  let mut chars = name.chars();
  let Some(first) = chars.next() else {
    return false;
  };
  (first == '_' || first.is_ascii_alphabetic())
    && chars.all(|ch| ch == '_' || ch.is_ascii_alphanumeric())
    && !LUA_KEYWORDS.contains(&name)
}

fn write_value(out: &mut String, value: &Value) {
  match value {
    Value::Null => out.push_str("nil"),
    Value::Bool(true) => out.push_str("true"),
    Value::Bool(false) => out.push_str("false"),
    Value::Number(number) => write_number(out, number),
    Value::String(text) => write_string(out, text),
    Value::Array(items) => {
      out.push('{');
      for (idx, item) in items.iter().enumerate() {
        if idx > 0 {
          out.push_str(", ");
        }
        write_value(out, item);
      }
      out.push('}');
    },
    Value::Object(map) => {
      out.push('{');
      for (idx, (key, item)) in map.iter().enumerate() {
        if idx > 0 {
          out.push_str(", ");
        }
        if is_lua_identifier(key) {
          out.push_str(key);
        } else {
          out.push('[');
          write_string(out, key);
          out.push(']');
        }
        out.push_str(" = ");
        write_value(out, item);
      }
      out.push('}');
    },
  }
}

fn write_number(out: &mut String, number: &Number) {
  if let Some(int) = number.as_i64() {
    let _ = write!(out, "{int}");
  } else if let Some(uint) = number.as_u64() {
    let _ = write!(out, "{uint}");
  } else if let Some(float) = number.as_f64().filter(|f| f.is_finite()) {
    let _ = write!(out, "{float:?}");
  } else {
    warn!(%number, "number has no lua literal form; sending it as a string");
    write_string(out, &number.to_string());
  }
}

fn write_string(out: &mut String, text: &str) {
  out.push('"');
  for ch in text.chars() {
    match ch {
      '\\' => out.push_str("\\\\"),
      '"' => out.push_str("\\\""),
      '\n' => out.push_str("\\n"),
      '\r' => out.push_str("\\r"),
      '\t' => out.push_str("\\t"),
      // Decimal escape, zero padded so a following digit is not absorbed.
      ch if (ch as u32) < 0x20 || ch == '\u{7f}' => {
        let _ = write!(out, "\\{:03}", ch as u32);
      },
      ch => out.push(ch),
    }
  }
  out.push('"');
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn serializes_table_of_inputs() {
    let cases = [
      (json!(null), "nil"),
      (json!(true), "true"),
      (json!(false), "false"),
      (json!(42), "42"),
      (json!(-7), "-7"),
      (json!(u64::MAX), "18446744073709551615"),
      (json!(1.5), "1.5"),
      (json!(2.0), "2.0"),
      (json!("plain"), r#""plain""#),
      (json!("say \"hi\"\n"), r#""say \"hi\"\n""#),
      (json!("back\\slash\ttab\r"), r#""back\\slash\ttab\r""#),
      (json!("bell\u{7}1"), r#""bell\0071""#),
      (json!([]), "{}"),
      (json!([1, "a", null]), r#"{1, "a", nil}"#),
      (json!({}), "{}"),
      (json!({ "q": 1 }), "{q = 1}"),
      (json!({ "with-dash": true, "end": 1 }), r#"{["end"] = 1, ["with-dash"] = true}"#),
      (json!({ "nested": { "list": [{ "x": "y" }] } }), r#"{nested = {list = {{x = "y"}}}}"#),
    ];

    for (input, expected) in cases {
      assert_eq!(serialize_for_peer(&input), expected, "input: {input}");
    }
  }

  #[test]
  fn identifier_rules() {
    assert!(is_lua_identifier("onSave"));
    assert!(is_lua_identifier("_private1"));
    assert!(!is_lua_identifier(""));
    assert!(!is_lua_identifier("1abc"));
    assert!(!is_lua_identifier("a.b"));
    assert!(!is_lua_identifier("function"));
  }
}
