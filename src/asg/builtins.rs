//! Process-wide registry of predeclared identifiers and builtin packages.
//!
//! Built once, never mutated, shared by every compilation. Nodes of the
//! semantic graph point into it with `&'static` references, so the identity of
//! a builtin is its address.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuiltinKind {
    Type,
    IntRange,
    Function {
        params: Vec<&'static str>,
        result: &'static str,
    },
    Constant,
}

/// A predeclared type, integer range, or a function/constant of a builtin
/// package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Builtin {
    pub name: String,
    pub doc: String,
    pub kind: BuiltinKind,
}

impl Builtin {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, BuiltinKind::Function { .. })
    }

    /// Parameter kinds of a function, empty for everything else.
    pub fn params(&self) -> &[&'static str] {
        match &self.kind {
            BuiltinKind::Function { params, .. } => params,
            _ => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltinPackage {
    /// Import path, e.g. `encoding/json`.
    pub id: &'static str,
    /// Default import alias, the last path element.
    pub name: String,
    pub doc: String,
    pub builtins: Vec<Builtin>,
}

impl BuiltinPackage {
    pub fn builtin(&self, name: &str) -> Option<&Builtin> {
        self.builtins.iter().find(|b| b.name == name)
    }
}

pub struct Registry {
    types: Vec<Builtin>,
    type_names: HashMap<&'static str, usize>,
    packages: BTreeMap<&'static str, BuiltinPackage>,
}

pub static BUILTINS: Lazy<Registry> = Lazy::new(Registry::new);

/// Builds the registry eagerly. Call before the first compilation so no
/// request pays for it.
pub fn init() {
    Lazy::force(&BUILTINS);
}

pub fn builtin_type(name: &str) -> Option<&'static Builtin> {
    BUILTINS.builtin_type(name)
}

pub fn builtin_package(id: &str) -> Option<&'static BuiltinPackage> {
    BUILTINS.packages.get(id)
}

pub fn builtin_packages() -> impl Iterator<Item = &'static BuiltinPackage> {
    BUILTINS.packages.values()
}

/// Names of every predeclared identifier, aliases included.
pub fn builtin_type_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.type_names.keys().copied()
}

fn code_fenced(code: &str) -> String {
    format!("```cue\n{code}\n```")
}

impl Registry {
    fn builtin_type(&'static self, name: &str) -> Option<&'static Builtin> {
        self.type_names.get(name).and_then(|idx| self.types.get(*idx))
    }

    fn new() -> Registry {
        let mut registry = Registry {
            types: Vec::new(),
            type_names: HashMap::new(),
            packages: BTreeMap::new(),
        };

        for (names, doc) in TYPES {
            let builtin = Builtin {
                name: names[0].to_string(),
                doc: doc.to_string(),
                kind: BuiltinKind::Type,
            };
            registry.add_type(names, builtin);
        }

        for (name, code) in INT_RANGES {
            let builtin = Builtin {
                name: name.to_string(),
                doc: format!(
                    "{}\nPredefined identifier to restrict the bounds of integers to common values.",
                    code_fenced(&format!("{name} : {code}"))
                ),
                kind: BuiltinKind::IntRange,
            };
            registry.add_type(&[*name], builtin);
        }

        for (id, doc, natives) in PACKAGES {
            let id: &'static str = id;
            let builtins = natives.iter().map(|native| native.to_builtin(id)).collect();
            let name = id.rsplit('/').next().unwrap_or(id).to_string();
            registry.packages.insert(
                id,
                BuiltinPackage {
                    id,
                    name,
                    doc: doc.to_string(),
                    builtins,
                },
            );
        }

        registry
    }

    fn add_type(&mut self, names: &[&'static str], builtin: Builtin) {
        self.types.push(builtin);
        let idx = self.types.len() - 1;
        for name in names {
            self.type_names.insert(*name, idx);
        }
    }
}

enum Native {
    Func(&'static str, &'static [&'static str], &'static str, &'static str),
    Const(&'static str, &'static str, &'static str),
}

impl Native {
    fn to_builtin(&self, id: &str) -> Builtin {
        let (name, signature, kind, doc) = match self {
            Native::Func(name, params, result, doc) => (
                name,
                format!("{name}({}) {result}", params.join(", ")),
                BuiltinKind::Function {
                    params: params.to_vec(),
                    result: *result,
                },
                doc,
            ),
            Native::Const(name, value, doc) => (name, format!("{name} : {value}"), BuiltinKind::Constant, doc),
        };
        let doc = match doc.is_empty() {
            true => format!("Builtin function from package `\"{id}\"`"),
            false => doc.to_string(),
        };

        Builtin {
            name: name.to_string(),
            doc: format!("{}\n{doc}", code_fenced(&signature)),
            kind,
        }
    }
}

const TYPES: &[(&[&str], &str)] = &[
    (
        &["string", "__string"],
        "Strings are sequences of Unicode characters. They support escape sequences, \
         multi-line strings enclosed by triple quotes, and interpolations.\n\
         ```cue\nmsg: \"You are \\(cost - budget) dollars over budget!\"\n```",
    ),
    (
        &["int", "__int"],
        "Integers, denoted `int`, are whole numbers. An integer literal defaults to `int`, \
         a literal with a decimal point is only compatible with `float`.\n\
         ```cue\na: int\na: 4\n\nb: [1_234, 5M, 1.5Gi, 0x1000_0000]\n```",
    ),
    (&["bool", "__bool"], "```cue\nbool\n```\nThe boolean type, `true | false`."),
    (&["float"], "```cue\nfloat\n```\nDecimal floating point numbers."),
    (&["number"], "```cue\nnumber\n```\nEither an `int` or a `float`: `int | float`."),
    (&["bytes"], "```cue\nbytes\n```\nSequences of bytes, written with single quotes."),
    (&["null"], "```cue\nnull\n```\nThe null value."),
    (
        &["_"],
        "Top is represented by the underscore character `_`, lexically an identifier. \
         Unifying any value `v` with top results `v` itself.\n\
         ```cue\n_ &  5     // 5\n_ & _|_    // _|_\n_ | _|_    // _\n```",
    ),
];

const INT_RANGES: &[(&str, &str)] = &[
    ("uint", ">=0"),
    ("uint8", ">=0 & <=255"),
    ("int8", ">=-128 & <=127"),
    ("uint16", ">=0 & <=65536"),
    ("int16", ">=-32_768 & <=32_767"),
    ("rune", ">=0 & <=0x10FFFF"),
    ("uint32", ">=0 & <=4_294_967_296"),
    ("int32", ">=-2_147_483_648 & <=2_147_483_647"),
    ("uint64", ">=0 & <=18_446_744_073_709_551_615"),
    ("int64", ">=-9_223_372_036_854_775_808 & <=9_223_372_036_854_775_807"),
    (
        "int128",
        ">=-170_141_183_460_469_231_731_687_303_715_884_105_728 & <=170_141_183_460_469_231_731_687_303_715_884_105_727",
    ),
    ("uint128", ">=0 & <=340_282_366_920_938_463_463_374_607_431_768_211_455"),
];

use Native::{Const, Func};

const PACKAGES: &[(&str, &str, &[Native])] = &[
    (
        "strings",
        "Package strings implements simple functions to manipulate UTF-8 encoded strings.",
        &[
            Func("Contains", &["string", "string"], "bool", "Contains reports whether substr is within s."),
            Func("ContainsAny", &["string", "string"], "bool", "ContainsAny reports whether any Unicode code points in chars are within s."),
            Func("Count", &["string", "string"], "int", "Count counts the number of non-overlapping instances of substr in s."),
            Func("HasPrefix", &["string", "string"], "bool", "HasPrefix tests whether the string s begins with prefix."),
            Func("HasSuffix", &["string", "string"], "bool", "HasSuffix tests whether the string s ends with suffix."),
            Func("Index", &["string", "string"], "int", ""),
            Func("Join", &["list", "string"], "string", "Join concatenates the elements of its first argument to create a single string."),
            Func("LastIndex", &["string", "string"], "int", ""),
            Func("MaxRunes", &["string", "int"], "bool", "MaxRunes reports whether the number of runes in s is at most max."),
            Func("MinRunes", &["string", "int"], "bool", "MinRunes reports whether the number of runes in s is at least min."),
            Func("Repeat", &["string", "int"], "string", ""),
            Func("Replace", &["string", "string", "string", "int"], "string", ""),
            Func("Split", &["string", "string"], "list", "Split slices s into all substrings separated by sep."),
            Func("SplitN", &["string", "string", "int"], "list", ""),
            Func("ToLower", &["string"], "string", "ToLower returns s with all Unicode letters mapped to their lower case."),
            Func("ToTitle", &["string"], "string", ""),
            Func("ToUpper", &["string"], "string", "ToUpper returns s with all Unicode letters mapped to their upper case."),
            Func("Trim", &["string", "string"], "string", ""),
            Func("TrimPrefix", &["string", "string"], "string", ""),
            Func("TrimSpace", &["string"], "string", "TrimSpace returns s with all leading and trailing white space removed."),
            Func("TrimSuffix", &["string", "string"], "string", ""),
        ],
    ),
    (
        "list",
        "Package list contains functions for manipulating and examining lists.",
        &[
            Func("Avg", &["list"], "number", "Avg computes the average of a list of numbers."),
            Func("Concat", &["list"], "list", "Concat takes a list of lists and concatenates them."),
            Func("Contains", &["list", "_"], "bool", ""),
            Func("Drop", &["list", "int"], "list", ""),
            Func("FlattenN", &["_", "int"], "list", ""),
            Func("Max", &["list"], "number", ""),
            Func("MaxItems", &["list", "int"], "bool", ""),
            Func("Min", &["list"], "number", ""),
            Func("MinItems", &["list", "int"], "bool", ""),
            Func("Product", &["list"], "number", ""),
            Func("Range", &["number", "number", "number"], "list", "Range generates a list of numbers using a start value, a limit value, and a step value."),
            Func("Repeat", &["list", "int"], "list", ""),
            Func("Slice", &["list", "int", "int"], "list", ""),
            Func("Sort", &["list", "_"], "list", "Sort sorts data while keeping the original order of equal elements."),
            Func("SortStrings", &["list"], "list", ""),
            Func("Sum", &["list"], "number", "Sum computes the sum of a list of numbers."),
            Func("Take", &["list", "int"], "list", ""),
            Func("UniqueItems", &["list"], "bool", ""),
        ],
    ),
    (
        "math",
        "Package math provides basic constants and mathematical functions.",
        &[
            Const("E", "2.71828182845904523536028747135266249775724709369995957496696763", ""),
            Const("Pi", "3.14159265358979323846264338327950288419716939937510582097494459", ""),
            Const("Phi", "1.61803398874989484820458683436563811772030917980576286213544861", ""),
            Const("Sqrt2", "1.41421356237309504880168872420969807856967187537694807317667974", ""),
            Const("Ln2", "0.693147180559945309417232121458176568075500134360255254120680009", ""),
            Const("Ln10", "2.30258509299404568401799145468436420760110148862877297603332790", ""),
            Func("Abs", &["number"], "number", "Abs returns the absolute value of x."),
            Func("Ceil", &["number"], "number", ""),
            Func("Exp", &["number"], "number", ""),
            Func("Floor", &["number"], "number", ""),
            Func("Log", &["number"], "number", ""),
            Func("MultipleOf", &["number", "number"], "bool", "MultipleOf reports whether x is a multiple of y."),
            Func("Pow", &["number", "number"], "number", ""),
            Func("Round", &["number"], "number", ""),
            Func("Sqrt", &["number"], "number", ""),
            Func("Trunc", &["number"], "number", ""),
        ],
    ),
    (
        "regexp",
        "Package regexp implements regular expression search.",
        &[
            Func("Find", &["string", "string"], "string", ""),
            Func("FindAll", &["string", "string", "int"], "list", ""),
            Func("FindNamedSubmatch", &["string", "string"], "struct", ""),
            Func("FindSubmatch", &["string", "string"], "list", ""),
            Func("Match", &["string", "string"], "bool", "Match reports whether the string s contains any match of the regular expression pattern."),
            Func("ReplaceAll", &["string", "string", "string"], "string", ""),
            Func("ReplaceAllLiteral", &["string", "string", "string"], "string", ""),
            Func("Valid", &["string"], "bool", "Valid reports whether the given regular expression is valid."),
        ],
    ),
    (
        "strconv",
        "Package strconv implements conversions to and from string representations of basic data types.",
        &[
            Func("Atoi", &["string"], "int", ""),
            Func("FormatBool", &["bool"], "string", ""),
            Func("FormatFloat", &["number", "int", "int", "int"], "string", ""),
            Func("FormatInt", &["int", "int"], "string", ""),
            Func("ParseBool", &["string"], "bool", ""),
            Func("ParseFloat", &["string", "int"], "number", ""),
            Func("ParseInt", &["string", "int", "int"], "int", ""),
            Func("ParseUint", &["string", "int", "int"], "int", ""),
            Func("Quote", &["string"], "string", ""),
            Func("Unquote", &["string"], "string", ""),
        ],
    ),
    (
        "encoding/json",
        "Package json implements encoding and decoding of JSON.",
        &[
            Func("Compact", &["bytes"], "string", ""),
            Func("HTMLEscape", &["bytes"], "string", ""),
            Func("Indent", &["bytes", "string", "string"], "string", ""),
            Func("Marshal", &["_"], "string", "Marshal returns the JSON encoding of v."),
            Func("MarshalStream", &["_"], "string", ""),
            Func("Unmarshal", &["bytes"], "_", "Unmarshal parses the JSON-encoded data."),
            Func("Valid", &["bytes"], "bool", "Valid reports whether data is a valid JSON encoding."),
            Func("Validate", &["bytes", "_"], "bool", ""),
        ],
    ),
    (
        "encoding/yaml",
        "Package yaml implements YAML support for CUE.",
        &[
            Func("Marshal", &["_"], "string", "Marshal returns the YAML encoding of v."),
            Func("MarshalStream", &["_"], "string", ""),
            Func("Unmarshal", &["bytes"], "_", "Unmarshal parses the YAML to a CUE expression."),
            Func("Validate", &["bytes", "_"], "bool", ""),
            Func("ValidatePartial", &["bytes", "_"], "bool", ""),
        ],
    ),
    (
        "struct",
        "Package struct defines utilities for struct types.",
        &[
            Func("MaxFields", &["struct", "int"], "bool", "MaxFields validates the maximum number of fields that are part of a struct."),
            Func("MinFields", &["struct", "int"], "bool", "MinFields validates the minimum number of fields that are part of a struct."),
        ],
    ),
    (
        "time",
        "Package time provides functionality for representing and displaying time.",
        &[
            Const("Nanosecond", "1", ""),
            Const("Microsecond", "1000", ""),
            Const("Millisecond", "1000000", ""),
            Const("Second", "1000000000", ""),
            Const("Minute", "60000000000", ""),
            Const("Hour", "3600000000000", ""),
            Const("RFC3339", "\"2006-01-02T15:04:05Z07:00\"", ""),
            Const("RFC3339Nano", "\"2006-01-02T15:04:05.999999999Z07:00\"", ""),
            Func("Duration", &["string"], "bool", "Duration validates a duration string."),
            Func("Format", &["string", "string"], "bool", ""),
            Func("FormatDuration", &["int"], "string", ""),
            Func("Parse", &["string", "string"], "string", ""),
            Func("ParseDuration", &["string"], "int", ""),
            Func("Split", &["string"], "struct", ""),
            Func("Time", &["string"], "bool", "Time validates a RFC3339 date-time."),
            Func("Unix", &["int", "int"], "string", ""),
        ],
    ),
];
