//! Update grammar (spec §4.3): `SET`, `REMOVE`, `ADD`, `DELETE` sections
//! joined with a single space, in that order when present.

use super::PlaceholderAllocator;
use crate::error::ExprError;
use crate::registry::ModelMetadata;
use crate::value::AttributeValue;

#[derive(Debug, Clone)]
pub enum SetAction {
    /// `SET f = :v`
    Assign(String, AttributeValue),
    /// `SET f = if_not_exists(f, :d)`
    IfNotExists(String, AttributeValue),
    /// `SET f = list_append(f, :v)` when `prepend` is false, else
    /// `list_append(:v, f)`.
    ListAppend { field: String, value: AttributeValue, prepend: bool },
    /// `SET f[i] = :v`
    IndexAssign { field: String, index: u32, value: AttributeValue },
}

#[derive(Debug, Clone)]
pub enum RemoveTarget {
    Field(String),
    Index(String, u32),
}

#[derive(Debug, Clone)]
pub struct AddAction {
    pub field: String,
    pub value: AttributeValue,
}

#[derive(Debug, Clone)]
pub struct DeleteAction {
    pub field: String,
    pub value: AttributeValue,
}

/// Accumulates the four update sections before compiling, mirroring the
/// teacher's accumulate-then-compile builder shape ([`super`] module doc).
#[derive(Debug, Default)]
pub struct UpdateBuilder {
    pub(crate) sets: Vec<SetAction>,
    pub(crate) removes: Vec<RemoveTarget>,
    pub(crate) adds: Vec<AddAction>,
    pub(crate) deletes: Vec<DeleteAction>,
}

impl UpdateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, action: SetAction) -> Self {
        self.sets.push(action);
        self
    }

    pub fn remove(mut self, target: RemoveTarget) -> Self {
        self.removes.push(target);
        self
    }

    pub fn add(mut self, action: AddAction) -> Self {
        self.adds.push(action);
        self
    }

    pub fn delete(mut self, action: DeleteAction) -> Self {
        self.deletes.push(action);
        self
    }

    fn target_field<'a>(action_field: &'a str) -> &'a str {
        action_field.split('[').next().unwrap_or(action_field)
    }

    /// Validate every action against the model's role/encryption rules
    /// (key fields are never updatable; encrypted fields only support
    /// `SET f = :v`) and compile the joined expression.
    pub fn compile(
        &self,
        alloc: &mut PlaceholderAllocator,
        meta: &ModelMetadata,
    ) -> Result<String, ExprError> {
        let check_field = |field: &str, allow_plain_set_only: bool| -> Result<(), ExprError> {
            let name = Self::target_field(field);
            if let Some(fm) = meta.field(name) {
                if fm.is_pk || fm.is_sk {
                    return Err(ExprError::KeyFieldInUpdate(name.to_string()));
                }
                if fm.is_encrypted && !allow_plain_set_only {
                    return Err(ExprError::EncryptedFieldUnsupportedAction(name.to_string()));
                }
            }
            Ok(())
        };

        for action in &self.sets {
            match action {
                SetAction::Assign(f, _) => check_field(f, true)?,
                SetAction::IfNotExists(f, _)
                | SetAction::ListAppend { field: f, .. }
                | SetAction::IndexAssign { field: f, .. } => check_field(f, false)?,
            }
        }
        for target in &self.removes {
            let f = match target {
                RemoveTarget::Field(f) | RemoveTarget::Index(f, _) => f,
            };
            check_field(f, false)?;
        }
        for action in &self.adds {
            check_field(&action.field, false)?;
            if let Some(fm) = meta.field(&action.field) {
                use crate::registry::AttrType;
                if !matches!(fm.attr_type, AttrType::N | AttrType::Ss | AttrType::Ns | AttrType::Bs) {
                    return Err(ExprError::InvalidAddTarget(action.field.clone()));
                }
            }
        }
        for action in &self.deletes {
            check_field(&action.field, false)?;
            if let Some(fm) = meta.field(&action.field) {
                use crate::registry::AttrType;
                if !matches!(fm.attr_type, AttrType::Ss | AttrType::Ns | AttrType::Bs) {
                    return Err(ExprError::InvalidDeleteTarget(action.field.clone()));
                }
            }
        }

        let mut sections = Vec::new();

        if !self.sets.is_empty() {
            let parts: Vec<String> = self
                .sets
                .iter()
                .map(|a| compile_set(a, alloc))
                .collect();
            sections.push(format!("SET {}", parts.join(", ")));
        }
        if !self.removes.is_empty() {
            let parts: Vec<String> = self
                .removes
                .iter()
                .map(|t| compile_remove(t, alloc))
                .collect();
            sections.push(format!("REMOVE {}", parts.join(", ")));
        }
        if !self.adds.is_empty() {
            let parts: Vec<String> = self
                .adds
                .iter()
                .map(|a| {
                    let f_ph = alloc.name("u", &a.field);
                    let v_ph = alloc.value("u", a.value.clone());
                    format!("{f_ph} {v_ph}")
                })
                .collect();
            sections.push(format!("ADD {}", parts.join(", ")));
        }
        if !self.deletes.is_empty() {
            let parts: Vec<String> = self
                .deletes
                .iter()
                .map(|a| {
                    let f_ph = alloc.name("u", &a.field);
                    let v_ph = alloc.value("u", a.value.clone());
                    format!("{f_ph} {v_ph}")
                })
                .collect();
            sections.push(format!("DELETE {}", parts.join(", ")));
        }

        Ok(sections.join(" "))
    }
}

fn compile_set(action: &SetAction, alloc: &mut PlaceholderAllocator) -> String {
    match action {
        SetAction::Assign(f, v) => {
            let f_ph = alloc.name("u", f);
            let v_ph = alloc.value("u", v.clone());
            format!("{f_ph} = {v_ph}")
        }
        SetAction::IfNotExists(f, d) => {
            let f_ph = alloc.name("u", f);
            let d_ph = alloc.value("u", d.clone());
            format!("{f_ph} = if_not_exists({f_ph}, {d_ph})")
        }
        SetAction::ListAppend { field, value, prepend } => {
            let f_ph = alloc.name("u", field);
            let v_ph = alloc.value("u", value.clone());
            if *prepend {
                format!("{f_ph} = list_append({v_ph}, {f_ph})")
            } else {
                format!("{f_ph} = list_append({f_ph}, {v_ph})")
            }
        }
        SetAction::IndexAssign { field, index, value } => {
            let f_ph = alloc.name("u", field);
            let v_ph = alloc.value("u", value.clone());
            format!("{f_ph}[{index}] = {v_ph}")
        }
    }
}

fn compile_remove(target: &RemoveTarget, alloc: &mut PlaceholderAllocator) -> String {
    match target {
        RemoveTarget::Field(f) => alloc.name("u", f),
        RemoveTarget::Index(f, i) => {
            let f_ph = alloc.name("u", f);
            format!("{f_ph}[{i}]")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AttrType, FieldMeta};

    fn meta() -> ModelMetadata {
        let mut pk = FieldMeta::scalar("pk", AttrType::S);
        pk.is_pk = true;
        let mut secret = FieldMeta::scalar("ssn", AttrType::S);
        secret.is_encrypted = true;
        let counter = FieldMeta::scalar("views", AttrType::N);
        ModelMetadata::build("Doc", "docs", vec![pk, secret, counter], vec![]).unwrap()
    }

    #[test]
    fn compiles_set_and_add_sections() {
        let mut alloc = PlaceholderAllocator::new();
        let builder = UpdateBuilder::new()
            .set(SetAction::Assign("views".into(), AttributeValue::n(1)))
            .add(AddAction { field: "views".into(), value: AttributeValue::n(1) });
        let expr = builder.compile(&mut alloc, &meta()).unwrap();
        assert!(expr.starts_with("SET "));
        assert!(expr.contains(" ADD "));
    }

    #[test]
    fn rejects_key_field_update() {
        let mut alloc = PlaceholderAllocator::new();
        let builder = UpdateBuilder::new().set(SetAction::Assign("pk".into(), AttributeValue::S("x".into())));
        let err = builder.compile(&mut alloc, &meta()).unwrap_err();
        assert!(matches!(err, ExprError::KeyFieldInUpdate(_)));
    }

    #[test]
    fn rejects_list_append_on_encrypted_field() {
        let mut alloc = PlaceholderAllocator::new();
        let builder = UpdateBuilder::new().set(SetAction::ListAppend {
            field: "ssn".into(),
            value: AttributeValue::S("x".into()),
            prepend: false,
        });
        let err = builder.compile(&mut alloc, &meta()).unwrap_err();
        assert!(matches!(err, ExprError::EncryptedFieldUnsupportedAction(_)));
    }

    #[test]
    fn allows_plain_set_on_encrypted_field() {
        let mut alloc = PlaceholderAllocator::new();
        let builder = UpdateBuilder::new().set(SetAction::Assign("ssn".into(), AttributeValue::S("x".into())));
        assert!(builder.compile(&mut alloc, &meta()).is_ok());
    }
}
