// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Hierarchical key/value option sets.
//!
//! Options are ordered and keys may repeat. A registration that advertises
//! several endpoints carries one `connect_address` entry per endpoint, in
//! order. Values are text, nested option sets, or typed handles appended by
//! the library itself.

use crate::binding::AdapterKey;
use crate::channel::ChannelHandle;
use crate::config::consts::{OPT_FD_CREATED_CB, OPT_FD_DESTROYED_CB};
use crate::errors::OptionsError;
use crate::sequence::SequenceHandle;
use serde_yaml::Value;

const CHANNEL_KEY: &str = "channel";
const DISPATCHER_MARKER: &str = "dispatcher";

#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    Text(String),
    Nested(Options),
    Channel(ChannelHandle),
    Sequence(SequenceHandle),
    Adapter(AdapterKey),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    entries: Vec<(String, OptionValue)>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an option set from a deserialized YAML/TOML value.
    ///
    /// Scalars become text, mappings become nested sets, and a list
    /// repeats its key once per item.
    ///
    /// # Example
    /// ```
    /// use the_switchboard::config::Options;
    ///
    /// let value: serde_yaml::Value = serde_yaml::from_str(
    ///     "group_name: blue\nconnect_address: [10.0.0.1, 10.0.0.2]",
    /// ).unwrap();
    /// let options = Options::from_value(&value).unwrap();
    ///
    /// assert_eq!(options.find_text("group_name"), Some("blue"));
    /// assert_eq!(options.find_all_text("connect_address").count(), 2);
    /// ```
    pub fn from_value(value: &Value) -> Result<Self, OptionsError> {
        match value {
            Value::Null => Ok(Self::new()),
            Value::Mapping(mapping) => {
                let mut options = Self::new();
                for (key, value) in mapping {
                    let key = match key {
                        Value::String(key) => key.clone(),
                        other => {
                            return Err(OptionsError::NonStringKey {
                                found: kind_name(other),
                            })
                        }
                    };
                    options.append_value(&key, value)?;
                }
                Ok(options)
            }
            Value::Tagged(tagged) => Self::from_value(&tagged.value),
            other => Err(OptionsError::NotAMapping {
                found: kind_name(other),
            }),
        }
    }

    fn append_value(&mut self, key: &str, value: &Value) -> Result<(), OptionsError> {
        match value {
            Value::Null => {}
            Value::Bool(b) => {
                self.append_text(key, &b.to_string());
            }
            Value::Number(n) => {
                self.append_text(key, &n.to_string());
            }
            Value::String(s) => {
                self.append_text(key, s);
            }
            Value::Sequence(items) => {
                for item in items {
                    self.append_value(key, item)?;
                }
            }
            Value::Mapping(_) => {
                let nested = Self::from_value(value)?;
                self.append(key, OptionValue::Nested(nested));
            }
            Value::Tagged(tagged) => self.append_value(key, &tagged.value)?,
        }
        Ok(())
    }

    pub fn append(&mut self, key: &str, value: OptionValue) -> &mut Self {
        self.entries.push((key.to_string(), value));
        self
    }

    pub fn append_text(&mut self, key: &str, value: &str) -> &mut Self {
        self.append(key, OptionValue::Text(value.to_string()))
    }

    /// First value stored under `key`.
    pub fn find(&self, key: &str) -> Option<&OptionValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn find_text<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        self.find_all_text(key).next()
    }

    pub fn find_all_text<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.entries.iter().filter_map(move |(k, v)| match v {
            OptionValue::Text(text) if k == key => Some(text.as_str()),
            _ => None,
        })
    }

    pub fn find_sub_option(&self, key: &str) -> Option<&Options> {
        self.entries.iter().find_map(|(k, v)| match v {
            OptionValue::Nested(nested) if k == key => Some(nested),
            _ => None,
        })
    }

    pub fn find_sub_option_mut(&mut self, key: &str) -> Option<&mut Options> {
        self.entries.iter_mut().find_map(|(k, v)| match v {
            OptionValue::Nested(nested) if k == key => Some(nested),
            _ => None,
        })
    }

    pub fn find_adapter(&self, key: &str) -> Option<AdapterKey> {
        match self.find(key)? {
            OptionValue::Adapter(adapter) => Some(*adapter),
            _ => None,
        }
    }

    pub fn find_sequence(&self, key: &str) -> Option<SequenceHandle> {
        match self.find(key)? {
            OptionValue::Sequence(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Replace the first value under `key`, or append if absent.
    pub fn update(&mut self, key: &str, value: OptionValue) {
        match self.entries.iter().position(|(k, _)| k == key) {
            Some(index) => self.entries[index].1 = value,
            None => {
                self.append(key, value);
            }
        }
    }

    /// Remove every entry under `key`, returning how many were removed.
    pub fn remove(&mut self, key: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(k, _)| k != key);
        before - self.entries.len()
    }

    /// Record `channel` as a member of the named channel group, creating
    /// the group's sub-option set if needed.
    pub fn append_channel(&mut self, group: &str, channel: ChannelHandle) {
        if self.find_sub_option(group).is_none() {
            self.append(group, OptionValue::Nested(Options::new()));
        }
        if let Some(nested) = self.find_sub_option_mut(group) {
            nested.append(CHANNEL_KEY, OptionValue::Channel(channel));
        }
    }

    pub fn channels(&self, group: &str) -> Vec<ChannelHandle> {
        self.find_sub_option(group)
            .map(|nested| {
                nested
                    .entries
                    .iter()
                    .filter_map(|(k, v)| match v {
                        OptionValue::Channel(handle) if k == CHANNEL_KEY => Some(*handle),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Ask the native layer to report channel created/destroyed events for
    /// channels opened with these options.
    pub fn append_dispatcher_callbacks(&mut self) {
        if !self.has_dispatcher_callbacks() {
            self.append_text(OPT_FD_CREATED_CB, DISPATCHER_MARKER);
            self.append_text(OPT_FD_DESTROYED_CB, DISPATCHER_MARKER);
        }
    }

    pub fn remove_dispatcher_callbacks(&mut self) {
        self.remove(OPT_FD_CREATED_CB);
        self.remove(OPT_FD_DESTROYED_CB);
    }

    pub fn has_dispatcher_callbacks(&self) -> bool {
        self.find(OPT_FD_CREATED_CB).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &OptionValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(yaml: &str) -> Options {
        let value: Value = serde_yaml::from_str(yaml).unwrap();
        Options::from_value(&value).unwrap()
    }

    #[test]
    fn test_nested_sets_and_scalars() {
        let options = parse(
            r#"
name_server_options:
  name_server_address: 127.0.0.1
  port: 20002
linger: 5
fault_tolerant_state: active
"#,
        );

        let ns = options.find_sub_option("name_server_options").unwrap();
        assert_eq!(ns.find_text("name_server_address"), Some("127.0.0.1"));
        assert_eq!(ns.find_text("port"), Some("20002"));
        assert_eq!(options.find_text("linger"), Some("5"));
        assert_eq!(options.find_text("fault_tolerant_state"), Some("active"));
        assert!(options.find_sub_option("linger").is_none());
    }

    #[test]
    fn test_lists_repeat_their_key_in_order() {
        let options = parse("connect_address: [10.0.0.1, 10.0.0.2, 10.0.0.3]");
        let addresses: Vec<&str> = options.find_all_text("connect_address").collect();
        assert_eq!(addresses, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(options.len(), 3);
    }

    #[test]
    fn test_rejects_non_mapping_root() {
        let value: Value = serde_yaml::from_str("- a\n- b").unwrap();
        assert_eq!(
            Options::from_value(&value),
            Err(OptionsError::NotAMapping { found: "sequence" })
        );
    }

    #[test]
    fn test_null_root_is_empty() {
        assert!(Options::from_value(&Value::Null).unwrap().is_empty());
    }

    #[test]
    fn test_append_channel_groups_handles() {
        let mut options = Options::new();
        options.append_channel("listening_group", ChannelHandle(1));
        options.append_channel("listening_group", ChannelHandle(2));
        options.append_channel("other", ChannelHandle(3));

        assert_eq!(
            options.channels("listening_group"),
            vec![ChannelHandle(1), ChannelHandle(2)]
        );
        assert_eq!(options.channels("missing"), Vec::<ChannelHandle>::new());
    }

    #[test]
    fn test_dispatcher_callbacks_append_once_and_remove() {
        let mut options = Options::new();
        options.append_dispatcher_callbacks();
        options.append_dispatcher_callbacks();
        assert!(options.has_dispatcher_callbacks());
        assert_eq!(options.len(), 2);

        options.remove_dispatcher_callbacks();
        assert!(!options.has_dispatcher_callbacks());
        assert!(options.is_empty());
    }

    #[test]
    fn test_update_replaces_first_or_appends() {
        let mut options = parse("group_name: red");
        options.update("group_name", OptionValue::Text("blue".into()));
        options.update("service_callbacks", OptionValue::Adapter(AdapterKey(3)));

        assert_eq!(options.find_text("group_name"), Some("blue"));
        assert_eq!(options.find_adapter("service_callbacks"), Some(AdapterKey(3)));
        assert_eq!(options.remove("service_callbacks"), 1);
        assert_eq!(options.find_adapter("service_callbacks"), None);
    }
}
