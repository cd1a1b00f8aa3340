#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use form_driver::{ChangeDetail, Config, Container, FormControl};

#[derive(Debug, Clone)]
pub struct FakeOption {
    pub value: String,
    pub selected: Cell<bool>,
}

#[derive(Debug, Clone)]
pub struct FakeField {
    pub tag: String,
    pub attrs: HashMap<String, String>,
    pub value: RefCell<String>,
    pub checked: Cell<bool>,
    pub options: Vec<FakeOption>,
    pub resets: Cell<usize>,
    pub children: RefCell<Vec<Rc<FakeField>>>,
}

impl FakeField {
    pub fn new(tag: &str, attrs: &[(&str, &str)]) -> Rc<Self> {
        Self::with_options(tag, attrs, &[])
    }

    pub fn with_options(tag: &str, attrs: &[(&str, &str)], option_values: &[&str]) -> Rc<Self> {
        Rc::new(Self {
            tag: tag.to_string(),
            attrs: attrs
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            value: RefCell::new(String::new()),
            checked: Cell::new(false),
            options: option_values
                .iter()
                .map(|value| FakeOption {
                    value: value.to_string(),
                    selected: Cell::new(false),
                })
                .collect(),
            resets: Cell::new(0),
            children: RefCell::new(Vec::new()),
        })
    }

    pub fn append(self: &Rc<Self>, child: &Rc<FakeField>) {
        self.children.borrow_mut().push(Rc::clone(child));
    }

    pub fn selected_values(&self) -> Vec<String> {
        self.options
            .iter()
            .filter(|option| option.selected.get())
            .map(|option| option.value.clone())
            .collect()
    }
}

impl FormControl for FakeField {
    fn value(&self) -> String {
        self.value.borrow().clone()
    }

    fn set_value(&self, value: &str) {
        *self.value.borrow_mut() = value.to_string();
    }

    fn checked(&self) -> bool {
        self.checked.get()
    }

    fn set_checked(&self, checked: bool) {
        self.checked.set(checked);
    }

    fn option_values(&self) -> Vec<String> {
        self.options
            .iter()
            .map(|option| option.value.clone())
            .collect()
    }

    fn set_option_selected(&self, value: &str, selected: bool) {
        for option in &self.options {
            if option.value == value {
                option.selected.set(selected);
            }
        }
    }

    fn reset(&self) {
        self.resets.set(self.resets.get() + 1);
    }
}

pub struct FakePage {
    pub roots: RefCell<Vec<Rc<FakeField>>>,
    pub queries: RefCell<Vec<String>>,
}

impl FakePage {
    pub fn new() -> Self {
        Self {
            roots: RefCell::new(Vec::new()),
            queries: RefCell::new(Vec::new()),
        }
    }

    pub fn append(&self, node: &Rc<FakeField>) {
        self.roots.borrow_mut().push(Rc::clone(node));
    }

    pub fn last_query(&self) -> String {
        self.queries.borrow().last().cloned().unwrap_or_default()
    }
}

impl Container for FakePage {
    type Field = Rc<FakeField>;

    fn query_selector(&self, selector: &str) -> Option<Rc<FakeField>> {
        self.queries.borrow_mut().push(selector.to_string());
        let compounds: Vec<Compound> = split_compounds(selector)
            .iter()
            .map(|part| parse_compound(part))
            .collect();
        query_nodes(&self.roots.borrow(), &compounds)
    }
}

struct Compound {
    tag: Option<String>,
    attrs: Vec<(String, String)>,
}

// Splits on spaces outside quoted attribute values.
fn split_compounds(selector: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for ch in selector.chars() {
        if escaped {
            current.push(ch);
            escaped = false;
            continue;
        }
        match ch {
            '\\' if in_quotes => {
                current.push(ch);
                escaped = true;
            }
            '"' => {
                current.push(ch);
                in_quotes = !in_quotes;
            }
            ' ' if !in_quotes => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(ch),
        }
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_compound(part: &str) -> Compound {
    let (tag, rest) = match part.find('[') {
        Some(idx) => (&part[..idx], &part[idx..]),
        None => (part, ""),
    };

    let mut attrs = Vec::new();
    let mut chars = rest.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '[' {
            continue;
        }
        let mut key = String::new();
        for ch in chars.by_ref() {
            if ch == '=' {
                break;
            }
            key.push(ch);
        }
        let quoted = matches!(chars.peek(), Some('"'));
        if quoted {
            chars.next();
        }
        let mut value = String::new();
        let mut escaped = false;
        while let Some(ch) = chars.next() {
            if escaped {
                value.push(ch);
                escaped = false;
                continue;
            }
            match ch {
                '\\' if quoted => escaped = true,
                '"' if quoted => {
                    if chars.peek() == Some(&']') {
                        chars.next();
                    }
                    break;
                }
                ']' if !quoted => break,
                _ => value.push(ch),
            }
        }
        attrs.push((key, value));
    }

    Compound {
        tag: if tag.is_empty() {
            None
        } else {
            Some(tag.to_string())
        },
        attrs,
    }
}

fn matches(node: &FakeField, compound: &Compound) -> bool {
    if let Some(tag) = &compound.tag {
        if node.tag != *tag {
            return false;
        }
    }
    compound
        .attrs
        .iter()
        .all(|(key, value)| node.attrs.get(key) == Some(value))
}

fn query_nodes(nodes: &[Rc<FakeField>], compounds: &[Compound]) -> Option<Rc<FakeField>> {
    let (first, rest) = compounds.split_first()?;
    for node in nodes {
        if matches(node, first) {
            if rest.is_empty() {
                return Some(Rc::clone(node));
            }
            if let Some(found) = query_nodes(&node.children.borrow(), rest) {
                return Some(found);
            }
        }
        if let Some(found) = query_nodes(&node.children.borrow(), compounds) {
            return Some(found);
        }
    }
    None
}

pub struct RecordedEvent {
    pub event: String,
    pub target: Rc<FakeField>,
    pub detail: Option<ChangeDetail>,
}

pub type EventLog = Rc<RefCell<Vec<RecordedEvent>>>;

pub fn event_log() -> EventLog {
    Rc::new(RefCell::new(Vec::new()))
}

pub fn recording_config(log: &EventLog) -> Config<Rc<FakeField>> {
    let log = Rc::clone(log);
    Config {
        fire_event: Box::new(move |event, target, detail| {
            log.borrow_mut().push(RecordedEvent {
                event: event.to_string(),
                target: Rc::clone(target),
                detail: detail.cloned(),
            });
        }),
    }
}
