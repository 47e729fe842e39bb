use std::rc::Rc;

#[derive(Debug)]
pub struct SymbolData {
    pub description: Option<String>,
}

impl SymbolData {
    pub fn new(description: Option<&str>) -> Rc<SymbolData> {
        Rc::new(SymbolData {
            description: description.map(str::to_string),
        })
    }
}

#[derive(Clone, Debug)]
pub enum PropertyKey {
    String(String),
    Symbol(Rc<SymbolData>),
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::String(s.to_string())
    }
}

impl From<String> for PropertyKey {
    fn from(s: String) -> Self {
        PropertyKey::String(s)
    }
}

impl From<&String> for PropertyKey {
    fn from(s: &String) -> Self {
        PropertyKey::String(s.clone())
    }
}

impl From<usize> for PropertyKey {
    fn from(n: usize) -> Self {
        PropertyKey::String(n.to_string())
    }
}

impl From<&Rc<SymbolData>> for PropertyKey {
    fn from(sym: &Rc<SymbolData>) -> Self {
        PropertyKey::Symbol(sym.clone())
    }
}

impl PropertyKey {
    /// Interprets a string key as an array index, if it is one.
    pub fn as_array_index(&self) -> Option<usize> {
        match self {
            PropertyKey::String(s) if s == "0" => Some(0),
            PropertyKey::String(s) if !s.starts_with('0') && !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => s.parse().ok(),
            _ => None,
        }
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropertyKey::String(s1), PropertyKey::String(s2)) => s1 == s2,
            (PropertyKey::Symbol(sym1), PropertyKey::Symbol(sym2)) => Rc::ptr_eq(sym1, sym2),
            _ => false,
        }
    }
}

impl Eq for PropertyKey {}

impl std::hash::Hash for PropertyKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            PropertyKey::String(s) => {
                0u8.hash(state);
                s.hash(state);
            }
            PropertyKey::Symbol(sym) => {
                1u8.hash(state);
                Rc::as_ptr(sym).hash(state);
            }
        }
    }
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyKey::String(s) => write!(f, "{}", s),
            PropertyKey::Symbol(sym) => match &sym.description {
                Some(d) => write!(f, "Symbol({})", d),
                None => write!(f, "Symbol()"),
            },
        }
    }
}
