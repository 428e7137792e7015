//! Document snapshot model and typed selectors.
//!
//! A [`DocumentSnapshot`] is an immutable view of a page at one instant: an
//! arena of [`Element`]s plus the state of the page's media element, if any.
//! Page classifiers and the completion detector are pure functions over a
//! snapshot, so they can be tested without a live page.
//!
//! [`Selector`] covers the small subset of CSS the classifiers need: a tag,
//! class and attribute conditions, negations, and an ancestor constraint.
//!
//! # Example
//!
//! ```
//! use autolearn_agent::dom::{DocumentSnapshot, Node, Selector};
//!
//! let mut doc = DocumentSnapshot::new("https://learn.example.com/#/list");
//! let list = doc.append(None, Node::new("div").class("course-list"));
//! doc.append(Some(list), Node::new("div").class("item").text("Ownership"));
//!
//! let items = doc.select(&Selector::any().class("item").inside(Selector::any().class("course-list")));
//! assert_eq!(items.len(), 1);
//! assert_eq!(doc.text_content(items[0]), "Ownership");
//! ```

use std::collections::BTreeMap;
use std::fmt;

/// Index of an element inside its snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId(pub usize);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One element of a snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    rendered: bool,
    parent: Option<ElementId>,
    children: Vec<ElementId>,
}

impl Element {
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    #[must_use]
    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    #[must_use]
    pub fn has_class(&self, class: &str) -> bool {
        self.classes.iter().any(|c| c == class)
    }

    #[must_use]
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// The element's own text, excluding descendants.
    #[must_use]
    pub fn own_text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn parent(&self) -> Option<ElementId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[ElementId] {
        &self.children
    }

    fn class_attr(&self) -> String {
        self.classes.join(" ")
    }
}

/// Builder for a new element.
#[derive(Debug, Clone)]
pub struct Node {
    tag: String,
    classes: Vec<String>,
    attributes: BTreeMap<String, String>,
    text: String,
    rendered: bool,
}

impl Node {
    #[must_use]
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            classes: Vec::new(),
            attributes: BTreeMap::new(),
            text: String::new(),
            rendered: true,
        }
    }

    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.classes.push(class.into());
        self
    }

    /// Adds every whitespace-separated class in `classes`.
    #[must_use]
    pub fn classes(mut self, classes: &str) -> Self {
        self.classes
            .extend(classes.split_whitespace().map(str::to_string));
        self
    }

    #[must_use]
    pub fn attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    /// Marks the element as not rendered (`display: none` or detached from layout).
    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.rendered = false;
        self
    }
}

/// Observable state of a media element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaState {
    /// Elapsed playback position in seconds.
    pub current_time: f64,
    /// Total length in seconds; may be zero or NaN before metadata loads.
    pub duration: f64,
    pub paused: bool,
    pub ended: bool,
    pub muted: bool,
    pub playback_rate: f64,
    /// Native looping flag.
    pub looping: bool,
}

impl MediaState {
    /// Ratio of elapsed to total time, or `None` if the duration is unusable.
    #[must_use]
    pub fn progress(&self) -> Option<f64> {
        if self.duration.is_finite() && self.duration > 0.0 && self.current_time.is_finite() {
            Some(self.current_time / self.duration)
        } else {
            None
        }
    }
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            current_time: 0.0,
            duration: f64::NAN,
            paused: true,
            ended: false,
            muted: false,
            playback_rate: 1.0,
            looping: false,
        }
    }
}

/// Immutable view of a page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DocumentSnapshot {
    location: String,
    elements: Vec<Element>,
    roots: Vec<ElementId>,
    media: Option<MediaState>,
}

impl DocumentSnapshot {
    /// Creates an empty document at `location`.
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            ..Self::default()
        }
    }

    /// Appends `node` as the last child of `parent`, or as a new root.
    ///
    /// # Panics
    ///
    /// Panics if `parent` does not belong to this document.
    pub fn append(&mut self, parent: Option<ElementId>, node: Node) -> ElementId {
        let id = ElementId(self.elements.len());
        match parent {
            Some(p) => self.elements[p.0].children.push(id),
            None => self.roots.push(id),
        }
        self.elements.push(Element {
            tag: node.tag,
            classes: node.classes,
            attributes: node.attributes,
            text: node.text,
            rendered: node.rendered,
            parent,
            children: Vec::new(),
        });
        id
    }

    pub fn set_media(&mut self, media: MediaState) {
        self.media = Some(media);
    }

    /// Page address, including any fragment route.
    #[must_use]
    pub fn location(&self) -> &str {
        &self.location
    }

    #[must_use]
    pub fn media(&self) -> Option<&MediaState> {
        self.media.as_ref()
    }

    #[must_use]
    pub fn element(&self, id: ElementId) -> Option<&Element> {
        self.elements.get(id.0)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Concatenated text of the element and its descendants, trimmed.
    #[must_use]
    pub fn text_content(&self, id: ElementId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out.trim().to_string()
    }

    fn collect_text(&self, id: ElementId, out: &mut String) {
        let Some(el) = self.element(id) else {
            return;
        };
        out.push_str(&el.text);
        for child in &el.children {
            self.collect_text(*child, out);
        }
    }

    /// True if the element and all its ancestors are rendered.
    #[must_use]
    pub fn is_rendered(&self, id: ElementId) -> bool {
        let mut current = Some(id);
        while let Some(cur) = current {
            match self.element(cur) {
                Some(el) if el.rendered => current = el.parent,
                _ => return false,
            }
        }
        true
    }

    /// All elements matching `selector`, in document order.
    #[must_use]
    pub fn select(&self, selector: &Selector) -> Vec<ElementId> {
        let mut out = Vec::new();
        for root in &self.roots {
            self.walk(*root, &mut |id| {
                if selector.matches(self, id) {
                    out.push(id);
                }
            });
        }
        out
    }

    #[must_use]
    pub fn select_first(&self, selector: &Selector) -> Option<ElementId> {
        self.select(selector).into_iter().next()
    }

    /// Descendants of `root` (excluding `root`) matching `selector`.
    #[must_use]
    pub fn select_within(&self, root: ElementId, selector: &Selector) -> Vec<ElementId> {
        let mut out = Vec::new();
        let Some(el) = self.element(root) else {
            return out;
        };
        for child in &el.children {
            self.walk(*child, &mut |id| {
                if selector.matches(self, id) {
                    out.push(id);
                }
            });
        }
        out
    }

    /// The element itself or its nearest ancestor matching `selector`.
    #[must_use]
    pub fn closest(&self, id: ElementId, selector: &Selector) -> Option<ElementId> {
        let mut current = Some(id);
        while let Some(cur) = current {
            if selector.matches(self, cur) {
                return Some(cur);
            }
            current = self.element(cur).and_then(Element::parent);
        }
        None
    }

    fn walk(&self, id: ElementId, visit: &mut impl FnMut(ElementId)) {
        visit(id);
        if let Some(el) = self.element(id) {
            for child in &el.children {
                self.walk(*child, visit);
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Class(String),
    ClassContains(String),
    NotClass(String),
    Attr(String),
    AttrEq(String, String),
    AttrContains(String, String),
    NotAttr(String),
}

impl Condition {
    fn matches(&self, el: &Element) -> bool {
        match self {
            Self::Class(c) => el.has_class(c),
            Self::ClassContains(s) => el.class_attr().contains(s.as_str()),
            Self::NotClass(c) => !el.has_class(c),
            Self::Attr(name) => el.attr(name).is_some(),
            Self::AttrEq(name, value) => el.attr(name) == Some(value.as_str()),
            Self::AttrContains(name, value) => {
                el.attr(name).is_some_and(|v| v.contains(value.as_str()))
            }
            Self::NotAttr(name) => el.attr(name).is_none(),
        }
    }
}

/// A compound element selector.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Selector {
    tag: Option<String>,
    conditions: Vec<Condition>,
    ancestor: Option<Box<Selector>>,
}

impl Selector {
    /// Matches any element (`*`).
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Matches elements with the given tag name.
    #[must_use]
    pub fn tag(tag: impl Into<String>) -> Self {
        Self {
            tag: Some(tag.into()),
            ..Self::default()
        }
    }

    /// `.class`
    #[must_use]
    pub fn class(mut self, class: impl Into<String>) -> Self {
        self.conditions.push(Condition::Class(class.into()));
        self
    }

    /// `[class*=fragment]`
    #[must_use]
    pub fn class_contains(mut self, fragment: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::ClassContains(fragment.into()));
        self
    }

    /// `:not(.class)`
    #[must_use]
    pub fn not_class(mut self, class: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotClass(class.into()));
        self
    }

    /// `[name]`
    #[must_use]
    pub fn attr(mut self, name: impl Into<String>) -> Self {
        self.conditions.push(Condition::Attr(name.into()));
        self
    }

    /// `[name=value]`
    #[must_use]
    pub fn attr_eq(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::AttrEq(name.into(), value.into()));
        self
    }

    /// `[name*=value]`
    #[must_use]
    pub fn attr_contains(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions
            .push(Condition::AttrContains(name.into(), value.into()));
        self
    }

    /// `:not([name])`
    #[must_use]
    pub fn not_attr(mut self, name: impl Into<String>) -> Self {
        self.conditions.push(Condition::NotAttr(name.into()));
        self
    }

    /// Descendant combinator: `ancestor self`.
    #[must_use]
    pub fn inside(mut self, ancestor: Selector) -> Self {
        self.ancestor = Some(Box::new(ancestor));
        self
    }

    /// Tests a single element of `doc`.
    #[must_use]
    pub fn matches(&self, doc: &DocumentSnapshot, id: ElementId) -> bool {
        let Some(el) = doc.element(id) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if !el.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if !self.conditions.iter().all(|c| c.matches(el)) {
            return false;
        }
        match &self.ancestor {
            None => true,
            Some(ancestor) => el
                .parent
                .and_then(|p| doc.closest(p, ancestor))
                .is_some(),
        }
    }
}
