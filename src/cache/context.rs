//! Per-request repository descriptors.

use crate::cache::traits::CmsEntity;
use crate::config::DirectusConfig;

/// Field used to order local listings unless told otherwise.
pub const DEFAULT_ORDER_BY: &str = "sort";

/// Immutable description of what a repository manages and how it reads.
///
/// Build a new one per logical request; `force_refresh` may differ between
/// callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
  entity_type: String,
  fields: Vec<String>,
  force_refresh: bool,
  collection_name: Option<String>,
  order_by: Option<String>,
}

impl Context {
  pub fn new(entity_type: impl Into<String>) -> Self {
    Self {
      entity_type: entity_type.into(),
      fields: Vec::new(),
      force_refresh: false,
      collection_name: None,
      order_by: Some(DEFAULT_ORDER_BY.to_string()),
    }
  }

  /// Fields requested from Directus; empty means all of them.
  pub fn with_fields<I, S>(mut self, fields: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.fields = fields.into_iter().map(Into::into).collect();
    self
  }

  pub fn with_force_refresh(mut self, force_refresh: bool) -> Self {
    self.force_refresh = force_refresh;
    self
  }

  pub fn with_collection_name(mut self, collection_name: impl Into<String>) -> Self {
    self.collection_name = Some(collection_name.into());
    self
  }

  /// Ordering field for local listings; `None` keeps insertion order.
  pub fn with_order_by(mut self, order_by: Option<String>) -> Self {
    self.order_by = order_by;
    self
  }

  pub fn entity_type(&self) -> &str {
    &self.entity_type
  }

  pub fn fields(&self) -> &[String] {
    &self.fields
  }

  pub fn is_force_refresh(&self) -> bool {
    self.force_refresh
  }

  /// Remote collection: the explicit override, or the lowercase plural of
  /// the entity type.
  pub fn collection_name(&self) -> String {
    match self.collection_name.as_deref() {
      Some(name) if !name.is_empty() => name.to_string(),
      _ => pluralize(&self.entity_type.to_lowercase()),
    }
  }

  pub fn order_by(&self) -> Option<&str> {
    self.order_by.as_deref()
  }
}

/// Optional parts of a context handed to [`ContextFactory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextOptions {
  pub fields: Vec<String>,
  pub collection_name: Option<String>,
  pub order_by: Option<String>,
}

impl Default for ContextOptions {
  fn default() -> Self {
    Self {
      fields: Vec::new(),
      collection_name: None,
      order_by: Some(DEFAULT_ORDER_BY.to_string()),
    }
  }
}

/// Builds contexts and decides whether they force a refresh.
#[derive(Debug, Clone, Copy)]
pub struct ContextFactory {
  enable_force_sync: bool,
}

impl ContextFactory {
  pub fn new(enable_force_sync: bool) -> Self {
    Self { enable_force_sync }
  }

  pub fn from_config(config: &DirectusConfig) -> Self {
    Self::new(config.enable_force_sync)
  }

  /// Build a context for `entity_type`.
  ///
  /// `force_new` is the per-request signal. It is only evaluated when force
  /// sync is enabled globally; both must hold for the context to force a
  /// refresh.
  pub fn create<F>(&self, entity_type: &str, options: ContextOptions, force_new: F) -> Context
  where
    F: FnOnce() -> bool,
  {
    let force_refresh = self.enable_force_sync && force_new();

    let context = Context::new(entity_type)
      .with_fields(options.fields)
      .with_force_refresh(force_refresh)
      .with_order_by(options.order_by);

    match options.collection_name {
      Some(name) => context.with_collection_name(name),
      None => context,
    }
  }

  /// Build a context for a typed entity.
  pub fn create_for<T, F>(&self, options: ContextOptions, force_new: F) -> Context
  where
    T: CmsEntity,
    F: FnOnce() -> bool,
  {
    self.create(T::entity_type(), options, force_new)
  }
}

/// Words whose plural is the same word.
const UNCOUNTABLE: &[&str] = &[
  "audio", "data", "equipment", "feedback", "fish", "information", "metadata", "money", "news",
  "series", "sheep", "software", "species", "traffic",
];

const IRREGULAR: &[(&str, &str)] = &[
  ("child", "children"),
  ("criterion", "criteria"),
  ("foot", "feet"),
  ("goose", "geese"),
  ("man", "men"),
  ("mouse", "mice"),
  ("person", "people"),
  ("tooth", "teeth"),
  ("woman", "women"),
];

/// English plural of a lowercase word, enough for collection names.
///
/// Whole words only: `news` and `person` are known, but compounds such as
/// `salesperson` fall through to the regular suffix rules.
fn pluralize(word: &str) -> String {
  if word.is_empty() || UNCOUNTABLE.contains(&word) {
    return word.to_string();
  }

  if let Some((_, plural)) = IRREGULAR.iter().find(|(singular, _)| *singular == word) {
    return plural.to_string();
  }

  if let Some(stem) = word.strip_suffix('y') {
    let before_vowel = stem
      .chars()
      .last()
      .map(|c| "aeiou".contains(c))
      .unwrap_or(false);
    if !before_vowel && !stem.is_empty() {
      return format!("{}ies", stem);
    }
  }

  if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
    return format!("{}es", word);
  }

  format!("{}s", word)
}
