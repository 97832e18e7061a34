//! Type representation for the Koral type system.
//!
//! `Type` is a closed sum covering primitives, function types, ownership
//! wrappers, nominal types (resolved through the definition registry by
//! identity), unresolved generic applications, rigid generic parameters and
//! unification variables. Everything here is registry-free; queries that
//! need to look inside nominal types live on [`CompilerContext`].
//!
//! [`CompilerContext`]: crate::context::CompilerContext

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::def_id::DefId;

/// A unification variable, identified by a `u32` index into the
/// unification table of one inference run.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TypeVar(pub u32);

impl fmt::Display for TypeVar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.0)
    }
}

/// A reference to a nominal declaration.
///
/// The `name` field is used ONLY for display. Identity is the `DefId`;
/// `PartialEq` and `Hash` ignore the name.
#[derive(Clone, Debug, Serialize)]
pub struct Nominal {
    pub def: DefId,
    pub name: String,
}

impl Nominal {
    pub fn new(def: DefId, name: impl Into<String>) -> Self {
        Nominal {
            def,
            name: name.into(),
        }
    }
}

impl PartialEq for Nominal {
    fn eq(&self, other: &Self) -> bool {
        self.def == other.def
    }
}

impl Eq for Nominal {}

impl std::hash::Hash for Nominal {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.def.hash(state);
    }
}

/// A Koral type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Type {
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    UInt,
    UInt8,
    UInt16,
    UInt32,
    UInt64,
    Float32,
    Float64,
    Bool,
    Void,
    Never,
    Function {
        params: Vec<Type>,
        returns: Box<Type>,
    },
    Reference(Box<Type>),
    Pointer(Box<Type>),
    WeakReference(Box<Type>),
    Structure(Nominal),
    Union(Nominal),
    Opaque(Nominal),
    /// A generic struct applied to arguments that have not been
    /// instantiated yet. Must never reach code generation.
    GenericStruct {
        template: Nominal,
        args: Vec<Type>,
    },
    /// A generic union applied to arguments that have not been
    /// instantiated yet. Must never reach code generation.
    GenericUnion {
        template: Nominal,
        args: Vec<Type>,
    },
    /// A rigid type parameter of a generic declaration, e.g. `T`.
    GenericParameter(String),
    /// An inference variable, local to one inference run.
    TypeVariable(TypeVar),
    /// A module used as a value (`vector` in `vector.add(..)`).
    Module(Nominal),
    TraitObject(String),
}

const PRIMITIVES: &[(&str, Type)] = &[
    ("Int", Type::Int),
    ("Int8", Type::Int8),
    ("Int16", Type::Int16),
    ("Int32", Type::Int32),
    ("Int64", Type::Int64),
    ("UInt", Type::UInt),
    ("UInt8", Type::UInt8),
    ("UInt16", Type::UInt16),
    ("UInt32", Type::UInt32),
    ("UInt64", Type::UInt64),
    ("Float32", Type::Float32),
    ("Float64", Type::Float64),
    ("Bool", Type::Bool),
    ("Void", Type::Void),
    ("Never", Type::Never),
];

impl Type {
    pub fn function(params: Vec<Type>, returns: Type) -> Type {
        Type::Function {
            params,
            returns: Box::new(returns),
        }
    }

    pub fn reference(inner: Type) -> Type {
        Type::Reference(Box::new(inner))
    }

    pub fn pointer(inner: Type) -> Type {
        Type::Pointer(Box::new(inner))
    }

    pub fn param(name: &str) -> Type {
        Type::GenericParameter(name.to_string())
    }

    /// Look up a primitive type by its source name.
    pub fn primitive(name: &str) -> Option<Type> {
        PRIMITIVES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, ty)| ty.clone())
    }

    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            Type::Int
                | Type::Int8
                | Type::Int16
                | Type::Int32
                | Type::Int64
                | Type::UInt
                | Type::UInt8
                | Type::UInt16
                | Type::UInt32
                | Type::UInt64
        )
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Type::Float32 | Type::Float64)
    }

    pub fn is_numeric(&self) -> bool {
        self.is_integer() || self.is_float()
    }

    /// Primitive scalar types: numbers, `Bool`, `Void` and `Never`.
    pub fn is_primitive(&self) -> bool {
        self.is_numeric() || matches!(self, Type::Bool | Type::Void | Type::Never)
    }

    pub fn is_type_variable(&self) -> bool {
        matches!(self, Type::TypeVariable(_))
    }

    /// The layout key of a primitive type, `None` for everything else.
    pub fn primitive_layout_key(&self) -> Option<&'static str> {
        Some(match self {
            Type::Int => "I",
            Type::Int8 => "I8",
            Type::Int16 => "I16",
            Type::Int32 => "I32",
            Type::Int64 => "I64",
            Type::UInt => "U",
            Type::UInt8 => "U8",
            Type::UInt16 => "U16",
            Type::UInt32 => "U32",
            Type::UInt64 => "U64",
            Type::Float32 => "F32",
            Type::Float64 => "F64",
            Type::Bool => "B",
            Type::Void => "V",
            Type::Never => "N",
            _ => return None,
        })
    }

    /// The nominal declaration behind this type, if any.
    pub fn nominal(&self) -> Option<&Nominal> {
        match self {
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) | Type::Module(n) => Some(n),
            Type::GenericStruct { template, .. } | Type::GenericUnion { template, .. } => {
                Some(template)
            }
            _ => None,
        }
    }

    /// Immediate child types, in order.
    pub fn children(&self) -> Vec<&Type> {
        match self {
            Type::Function { params, returns } => {
                params.iter().chain(std::iter::once(returns.as_ref())).collect()
            }
            Type::Reference(inner) | Type::Pointer(inner) | Type::WeakReference(inner) => {
                vec![inner.as_ref()]
            }
            Type::GenericStruct { args, .. } | Type::GenericUnion { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Rebuild this type by applying `f` to each immediate child type.
    /// Leaf types are returned unchanged without calling `f`.
    pub fn try_map_children<E>(
        &self,
        f: &mut impl FnMut(&Type) -> Result<Type, E>,
    ) -> Result<Type, E> {
        Ok(match self {
            Type::Function { params, returns } => Type::Function {
                params: params.iter().map(&mut *f).collect::<Result<_, _>>()?,
                returns: Box::new(f(returns)?),
            },
            Type::Reference(inner) => Type::Reference(Box::new(f(inner)?)),
            Type::Pointer(inner) => Type::Pointer(Box::new(f(inner)?)),
            Type::WeakReference(inner) => Type::WeakReference(Box::new(f(inner)?)),
            Type::GenericStruct { template, args } => Type::GenericStruct {
                template: template.clone(),
                args: args.iter().map(&mut *f).collect::<Result<_, _>>()?,
            },
            Type::GenericUnion { template, args } => Type::GenericUnion {
                template: template.clone(),
                args: args.iter().map(&mut *f).collect::<Result<_, _>>()?,
            },
            other => other.clone(),
        })
    }

    /// Whether `pred` holds for this type or any type nested in it.
    /// Does not look through nominal types into their members.
    pub fn any(&self, pred: &impl Fn(&Type) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            Type::Function { params, returns } => {
                params.iter().any(|p| p.any(pred)) || returns.any(pred)
            }
            Type::Reference(inner) | Type::Pointer(inner) | Type::WeakReference(inner) => {
                inner.any(pred)
            }
            Type::GenericStruct { args, .. } | Type::GenericUnion { args, .. } => {
                args.iter().any(|a| a.any(pred))
            }
            _ => false,
        }
    }

    /// Replace generic parameters by name.
    pub fn substitute(&self, map: &FxHashMap<String, Type>) -> Type {
        if map.is_empty() {
            return self.clone();
        }
        match self {
            Type::GenericParameter(name) => map.get(name).cloned().unwrap_or_else(|| self.clone()),
            _ => {
                let mapped: Result<Type, std::convert::Infallible> =
                    self.try_map_children(&mut |child| Ok(child.substitute(map)));
                match mapped {
                    Ok(ty) => ty,
                    Err(never) => match never {},
                }
            }
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Type]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some((name, _)) = PRIMITIVES.iter().find(|(_, ty)| ty == self) {
            return write!(f, "{}", name);
        }
        match self {
            Type::Function { params, returns } => {
                write!(f, "(")?;
                write_list(f, params)?;
                write!(f, ") -> {}", returns)
            }
            Type::Reference(inner) => write!(f, "{} ref", inner),
            Type::Pointer(inner) => write!(f, "{} ptr", inner),
            Type::WeakReference(inner) => write!(f, "{} weakref", inner),
            Type::Structure(n) | Type::Union(n) | Type::Opaque(n) => write!(f, "{}", n.name),
            Type::GenericStruct { template, args } | Type::GenericUnion { template, args } => {
                write!(f, "[")?;
                write_list(f, args)?;
                write!(f, "]{}", template.name)
            }
            Type::GenericParameter(name) => write!(f, "{}", name),
            Type::TypeVariable(var) => write!(f, "{}", var),
            Type::Module(n) => write!(f, "module({})", n.name),
            Type::TraitObject(name) => write!(f, "{} dyn", name),
            _ => Ok(()),
        }
    }
}

// ── ena trait implementations ──────────────────────────────────────────

impl ena::unify::UnifyKey for TypeVar {
    type Value = Option<Type>;

    fn index(&self) -> u32 {
        self.0
    }

    fn from_index(u: u32) -> Self {
        TypeVar(u)
    }

    fn tag() -> &'static str {
        "TypeVar"
    }
}

impl ena::unify::EqUnifyValue for Type {}
