use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::IndexMap;

use crate::{
    ast::{ClassDecl, MethodDecl, VarDecl},
    diagnostics::SourceSpan,
    value::Value,
};

pub type ClassRef = Rc<ClassDescriptor>;
pub type InstanceRef = Rc<Instance>;

/// Static shape shared by every instance of a class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: String,
    /// Declaration order is the order field initializers run in.
    pub fields: IndexMap<String, VarDecl>,
    pub methods: IndexMap<String, Rc<MethodDecl>>,
    pub span: SourceSpan,
}

impl ClassDescriptor {
    /// Later members with a repeated name replace earlier ones.
    pub fn from_decl(decl: &ClassDecl) -> Self {
        let fields = decl
            .fields
            .iter()
            .map(|field| (field.name.clone(), field.clone()))
            .collect();
        let methods = decl
            .methods
            .iter()
            .map(|method| (method.name.clone(), Rc::clone(method)))
            .collect();
        Self {
            name: decl.name.clone(),
            fields,
            methods,
            span: decl.span,
        }
    }

    pub fn find_method(&self, name: &str) -> Option<&Rc<MethodDecl>> {
        self.methods.get(name)
    }
}

/// A live object: its class plus a field map that every alias of the
/// instance observes.
pub struct Instance {
    class: ClassRef,
    fields: RefCell<IndexMap<String, Value>>,
}

impl Instance {
    /// Every declared field starts out as `null`; initializers are run by the
    /// interpreter afterwards.
    pub fn new(class: ClassRef) -> InstanceRef {
        let fields = class
            .fields
            .keys()
            .map(|name| (name.clone(), Value::null()))
            .collect();
        Rc::new(Self {
            class,
            fields: RefCell::new(fields),
        })
    }

    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    /// Writes a field, adding it if the class never declared it.
    pub fn set(&self, name: &str, value: Value) {
        let mut fields = self.fields.borrow_mut();
        match fields.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                fields.insert(name.to_string(), value);
            }
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.borrow().contains_key(name)
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name)
            .field("fields", &self.fields.borrow())
            .finish()
    }
}
