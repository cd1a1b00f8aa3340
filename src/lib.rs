use std::cell::{Cell, RefCell};
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    InvalidDescriptor(String),
    FieldNotFound(String),
    InvalidArgument(String),
    InvalidChangeEvent(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDescriptor(msg) => write!(f, "invalid descriptor: {msg}"),
            Self::FieldNotFound(selector) => write!(f, "field not found: {selector}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidChangeEvent(msg) => write!(f, "invalid change event: {msg}"),
        }
    }
}

impl StdError for Error {}

pub trait FormControl: Clone {
    fn value(&self) -> String;
    fn set_value(&self, value: &str);
    fn checked(&self) -> bool;
    fn set_checked(&self, checked: bool);

    fn option_values(&self) -> Vec<String> {
        Vec::new()
    }

    fn set_option_selected(&self, _value: &str, _selected: bool) {}

    fn reset(&self) {}
}

impl<T: FormControl> FormControl for Rc<T> {
    fn value(&self) -> String {
        (**self).value()
    }

    fn set_value(&self, value: &str) {
        (**self).set_value(value)
    }

    fn checked(&self) -> bool {
        (**self).checked()
    }

    fn set_checked(&self, checked: bool) {
        (**self).set_checked(checked)
    }

    fn option_values(&self) -> Vec<String> {
        (**self).option_values()
    }

    fn set_option_selected(&self, value: &str, selected: bool) {
        (**self).set_option_selected(value, selected)
    }

    fn reset(&self) {
        (**self).reset()
    }
}

pub trait Container {
    type Field: FormControl;

    fn query_selector(&self, selector: &str) -> Option<Self::Field>;
}

pub type FireEvent<F> = Box<dyn Fn(&str, &F, Option<&ChangeDetail>)>;

pub struct Config<F> {
    pub fire_event: FireEvent<F>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeTarget {
    pub name: Option<String>,
    pub value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeDetail {
    pub target: ChangeTarget,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Descriptor {
    pub parent: Option<String>,
    pub tag: Option<String>,
    pub id: Option<String>,
    pub name: Option<String>,
    pub test_id: Option<String>,
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeOptions {
    pub name: Option<String>,
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub selected: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldOptions {
    pub descriptor: Descriptor,
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub selected: Option<Vec<String>>,
}

// Empty strings behave as unset, matching the options records this API accepts.
fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|value| !value.is_empty())
}

fn escape_attr_value(attr: &str, value: &str) -> Result<String> {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if ch.is_control() {
            return Err(Error::InvalidDescriptor(format!(
                "{attr} value must not contain control characters"
            )));
        }
        if ch == '"' || ch == '\\' {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    Ok(escaped)
}

fn validate_token(what: &str, token: &str) -> Result<()> {
    if token
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
    {
        Ok(())
    } else {
        Err(Error::InvalidDescriptor(format!(
            "{what} must contain only ascii letters, digits, '-' or '_': {token}"
        )))
    }
}

fn attr_clause(attr: &str, value: &str) -> Result<String> {
    Ok(format!("[{attr}=\"{}\"]", escape_attr_value(attr, value)?))
}

fn identity_clause(descriptor: &Descriptor) -> Result<Option<String>> {
    if let Some(id) = non_empty(&descriptor.id) {
        return attr_clause("id", id).map(Some);
    }
    if let Some(name) = non_empty(&descriptor.name) {
        return attr_clause("name", name).map(Some);
    }
    if let Some(test_id) = non_empty(&descriptor.test_id) {
        return attr_clause("data-testid", test_id).map(Some);
    }
    Ok(None)
}

fn build_selector(descriptor: &Descriptor) -> Result<String> {
    let identity = identity_clause(descriptor)?;
    let tag = non_empty(&descriptor.tag);
    if identity.is_none() && tag.is_none() {
        return Err(Error::InvalidDescriptor(
            "one of id, name, test_id or tag is required".into(),
        ));
    }

    let mut selector = String::new();
    if let Some(tag) = tag {
        validate_token("tag", tag)?;
        selector.push_str(tag);
    }
    if let Some(identity) = identity {
        selector.push_str(&identity);
    }
    // type stays unquoted; the token rule keeps it selector-safe.
    if let Some(kind) = non_empty(&descriptor.kind) {
        validate_token("type", kind)?;
        selector.push_str(&format!("[type={kind}]"));
    }
    if let Some(parent) = non_empty(&descriptor.parent) {
        selector = format!("{parent} {selector}");
    }
    Ok(selector)
}

fn scope_selector(descriptor: &Descriptor) -> Result<Option<String>> {
    let identity = identity_clause(descriptor)?;
    Ok(match (non_empty(&descriptor.parent), identity) {
        (Some(parent), Some(identity)) => Some(format!("{parent} {identity}")),
        (Some(parent), None) => Some(parent.to_string()),
        (None, Some(identity)) => Some(identity),
        (None, None) => None,
    })
}

fn change_payload(opts: &ChangeOptions) -> Result<ChangeTarget> {
    let name = non_empty(&opts.name).map(str::to_string);
    let value = non_empty(&opts.value).map(str::to_string);
    let checked = opts.checked.filter(|checked| *checked);

    let set = usize::from(value.is_some())
        + usize::from(checked.is_some())
        + usize::from(opts.selected.is_some());
    if set == 0 {
        return Err(Error::InvalidChangeEvent(
            "must carry a checked, value or selected option".into(),
        ));
    }
    if set > 1 {
        return Err(Error::InvalidChangeEvent(
            "must carry a checked, value or selected option, not several".into(),
        ));
    }

    Ok(ChangeTarget { name, value })
}

pub fn api_for<C: Container>(container: &C, config: Config<C::Field>) -> Api<'_, C> {
    Api {
        container,
        fire_event: config.fire_event,
        trace: Cell::new(false),
        trace_logs: RefCell::new(Vec::new()),
        trace_log_limit: Cell::new(10_000),
    }
}

pub struct Api<'a, C: Container> {
    container: &'a C,
    fire_event: FireEvent<C::Field>,
    trace: Cell<bool>,
    trace_logs: RefCell<Vec<String>>,
    trace_log_limit: Cell<usize>,
}

impl<'a, C: Container> Api<'a, C> {
    pub fn element_by(&self, descriptor: &Descriptor) -> Result<Option<C::Field>> {
        let selector = build_selector(descriptor)?;
        Ok(self.query(&selector))
    }

    pub fn elements_for(
        &self,
        descriptors: &[(&str, Descriptor)],
    ) -> Result<Vec<(String, Option<C::Field>)>> {
        let mut resolved = Vec::with_capacity(descriptors.len());
        for (key, descriptor) in descriptors {
            resolved.push(((*key).to_string(), self.element_by(descriptor)?));
        }
        Ok(resolved)
    }

    pub fn for_field(&self, field: C::Field) -> FieldApi<'_, C> {
        FieldApi { api: self, field }
    }

    pub fn set_value(&self, opts: &FieldOptions) -> Result<C::Field> {
        let field = self.select_field(&opts.descriptor)?;
        let field_api = self.for_field(field);
        match non_empty(&opts.value) {
            Some(value) => field_api.set_value(value),
            None => field_api.set_checked(opts.checked),
        }
    }

    pub fn set_checked(&self, opts: &FieldOptions) -> Result<C::Field> {
        let field = self.select_field(&opts.descriptor)?;
        self.for_field(field).set_checked(opts.checked)
    }

    pub fn set_selected(&self, opts: &FieldOptions) -> Result<C::Field> {
        let field = self.select_field(&opts.descriptor)?;
        self.for_field(field).set_selected(opts.selected.as_deref())
    }

    pub fn check(&self, descriptor: &Descriptor) -> Result<C::Field> {
        self.set_checked(&FieldOptions {
            descriptor: descriptor.clone(),
            checked: Some(true),
            ..FieldOptions::default()
        })
    }

    pub fn uncheck(&self, descriptor: &Descriptor) -> Result<C::Field> {
        self.set_checked(&FieldOptions {
            descriptor: descriptor.clone(),
            checked: Some(false),
            ..FieldOptions::default()
        })
    }

    pub fn clear_value(&self, descriptor: &Descriptor) -> Result<C::Field> {
        let field = self.select_field(descriptor)?;
        self.for_field(field).clear_value()
    }

    pub fn clear_selected(&self, descriptor: &Descriptor) -> Result<C::Field> {
        let field = self.select_field(descriptor)?;
        self.for_field(field).clear_selected()
    }

    pub fn clear(&self, descriptor: &Descriptor) -> Result<C::Field> {
        let field = self.select_field(descriptor)?;
        self.for_field(field).clear()
    }

    pub fn set_values(&self, fields: &[(&str, FieldOptions)]) -> Result<Vec<(String, C::Field)>> {
        let mut resolved = Vec::with_capacity(fields.len());
        for (key, opts) in fields {
            resolved.push(((*key).to_string(), self.set_value(opts)?));
        }
        Ok(resolved)
    }

    pub fn change_values(
        &self,
        fields: &[(&str, FieldOptions)],
    ) -> Result<Vec<(String, C::Field)>> {
        let mut resolved = Vec::with_capacity(fields.len());
        for (key, opts) in fields {
            resolved.push(((*key).to_string(), self.change(opts)?));
        }
        Ok(resolved)
    }

    pub fn submit(&self, descriptor: &Descriptor) -> Result<C::Field> {
        let button = self.select_field(&Descriptor {
            parent: scope_selector(descriptor)?,
            tag: Some("button".into()),
            kind: Some("submit".into()),
            ..Descriptor::default()
        })?;
        self.fire("click", &button, None);
        Ok(button)
    }

    pub fn reset(&self, descriptor: &Descriptor) -> Result<Option<C::Field>> {
        let form = self.element_by(&Descriptor {
            tag: Some("form".into()),
            ..descriptor.clone()
        })?;
        if let Some(form) = &form {
            form.reset();
        }
        Ok(form)
    }

    pub fn change(&self, opts: &FieldOptions) -> Result<C::Field> {
        let field = self.select_field(&opts.descriptor)?;
        let name = non_empty(&opts.descriptor.id)
            .or_else(|| non_empty(&opts.descriptor.name))
            .map(str::to_string);
        self.for_field(field).change(&ChangeOptions {
            name,
            value: opts.value.clone(),
            checked: opts.checked,
            selected: opts.selected.clone(),
        })
    }

    pub fn change_value(&self, opts: &FieldOptions) -> Result<C::Field> {
        self.change(&FieldOptions {
            checked: None,
            selected: None,
            ..opts.clone()
        })
    }

    pub fn change_checked(&self, opts: &FieldOptions) -> Result<C::Field> {
        self.change(&FieldOptions {
            value: None,
            selected: None,
            ..opts.clone()
        })
    }

    pub fn change_selected(&self, opts: &FieldOptions) -> Result<C::Field> {
        self.change(&FieldOptions {
            value: None,
            checked: None,
            ..opts.clone()
        })
    }

    pub fn enable_trace(&self, enabled: bool) {
        self.trace.set(enabled);
    }

    pub fn take_trace_logs(&self) -> Vec<String> {
        std::mem::take(&mut *self.trace_logs.borrow_mut())
    }

    pub fn set_trace_log_limit(&self, max_entries: usize) -> Result<()> {
        if max_entries == 0 {
            return Err(Error::InvalidArgument(
                "set_trace_log_limit requires at least 1 entry".into(),
            ));
        }
        self.trace_log_limit.set(max_entries);
        let mut logs = self.trace_logs.borrow_mut();
        while logs.len() > max_entries {
            logs.remove(0);
        }
        Ok(())
    }

    fn select_field(&self, descriptor: &Descriptor) -> Result<C::Field> {
        let selector = build_selector(descriptor)?;
        self.query(&selector)
            .ok_or_else(|| Error::FieldNotFound(selector))
    }

    fn query(&self, selector: &str) -> Option<C::Field> {
        let found = self.container.query_selector(selector);
        self.trace_line(format!(
            "[lookup] selector={selector} found={}",
            found.is_some()
        ));
        found
    }

    fn fire(&self, event: &str, field: &C::Field, detail: Option<&ChangeDetail>) {
        self.trace_line(match detail {
            Some(detail) => format!(
                "[event] {event} name={} value={}",
                detail.target.name.as_deref().unwrap_or("-"),
                detail.target.value.as_deref().unwrap_or("-")
            ),
            None => format!("[event] {event}"),
        });
        (self.fire_event)(event, field, detail);
    }

    fn trace_line(&self, line: String) {
        if !self.trace.get() {
            return;
        }
        let mut logs = self.trace_logs.borrow_mut();
        logs.push(line);
        while logs.len() > self.trace_log_limit.get() {
            logs.remove(0);
        }
    }
}

pub struct FieldApi<'a, C: Container> {
    api: &'a Api<'a, C>,
    field: C::Field,
}

impl<'a, C: Container> FieldApi<'a, C> {
    pub fn field(&self) -> &C::Field {
        &self.field
    }

    pub fn set_value(&self, value: &str) -> Result<C::Field> {
        self.field.set_value(value);
        Ok(self.field.clone())
    }

    pub fn clear_value(&self) -> Result<C::Field> {
        self.field.set_value("");
        Ok(self.field.clone())
    }

    pub fn set_checked(&self, checked: Option<bool>) -> Result<C::Field> {
        let Some(checked) = checked else {
            return Err(Error::InvalidArgument(
                "set_checked: the checked option must be set to true or false, not left out".into(),
            ));
        };
        self.field.set_checked(checked);
        Ok(self.field.clone())
    }

    pub fn set_selected(&self, selected: Option<&[String]>) -> Result<C::Field> {
        let Some(selected) = selected else {
            return Err(Error::InvalidArgument(
                "set_selected: must take the list of option values to be selected".into(),
            ));
        };
        for value in self.field.option_values() {
            if selected.contains(&value) {
                self.field.set_option_selected(&value, true);
            }
        }
        Ok(self.field.clone())
    }

    pub fn set_unselected(&self, unselected: Option<&[String]>) -> Result<C::Field> {
        let Some(unselected) = unselected else {
            return Err(Error::InvalidArgument(
                "set_unselected: must take the list of option values to be unselected".into(),
            ));
        };
        for value in self.field.option_values() {
            if unselected.contains(&value) {
                self.field.set_option_selected(&value, false);
            }
        }
        Ok(self.field.clone())
    }

    pub fn clear_selected(&self) -> Result<C::Field> {
        for value in self.field.option_values() {
            self.field.set_option_selected(&value, false);
        }
        Ok(self.field.clone())
    }

    pub fn clear(&self) -> Result<C::Field> {
        self.clear_value()?;
        self.clear_selected()?;
        self.set_checked(Some(false))
    }

    // Handles value, checked and selected changes through one payload.
    pub fn change(&self, opts: &ChangeOptions) -> Result<C::Field> {
        let target = change_payload(opts)?;
        let detail = ChangeDetail { target };
        self.api.fire("change", &self.field, Some(&detail));
        Ok(self.field.clone())
    }

    pub fn change_value(&self, opts: &ChangeOptions) -> Result<C::Field> {
        self.change(&ChangeOptions {
            checked: None,
            selected: None,
            ..opts.clone()
        })
    }

    pub fn change_checked(&self, opts: &ChangeOptions) -> Result<C::Field> {
        self.change(&ChangeOptions {
            value: None,
            selected: None,
            ..opts.clone()
        })
    }

    pub fn change_selected(&self, opts: &ChangeOptions) -> Result<C::Field> {
        self.change(&ChangeOptions {
            value: None,
            checked: None,
            ..opts.clone()
        })
    }
}
