// Copyright 2025 The callchain developers
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use core::fmt::Write as _;

use chaos_theory::{Source, make};

use crate::{Catalog, Fault, Field, Operation, Rand, Sequence, Type, Value, Variable};

/// Small class hierarchy with a catalog of operations over it:
///
/// ```text
/// interface Shape
/// class Foo implements Shape { int count; static int instances; }
/// class Bar extends Foo
/// enum Color { RED, GREEN }
/// ```
pub(crate) struct Fixture {
    pub(crate) catalog: Catalog,
    pub(crate) shape: Type,
    pub(crate) foo: Type,
    pub(crate) bar: Type,
    pub(crate) color: Type,
}

fn count_of(v: &Value) -> Result<i32, Fault> {
    let o = v
        .as_object()
        .ok_or_else(|| Fault::null_reference("Foo.count"))?;
    Ok(o.field("count").as_int().unwrap_or(0))
}

impl Fixture {
    pub(crate) fn new() -> Self {
        let mut catalog = Catalog::new();
        let types = catalog.types_mut();
        let shape = types.define_interface("Shape", &[]).unwrap();
        let foo = types.define_class("Foo", &["Shape"]).unwrap();
        let bar = types.define_class("Bar", &["Foo"]).unwrap();
        let color = types.define_enum("Color", &["RED", "GREEN"]).unwrap();
        let int = Type::int();

        let t = foo.clone();
        catalog.register(
            Operation::constructor(foo.clone(), [int.clone()], move |args, _| {
                let v = Value::new_object(t.clone());
                if let Some(o) = v.as_object() {
                    o.set_field("count", args[0].clone());
                }
                Ok(v)
            })
            .unwrap(),
        );
        let t = foo.clone();
        catalog.register(
            Operation::constructor(foo.clone(), [], move |_, _| Ok(Value::new_object(t.clone())))
                .unwrap(),
        );
        let t = bar.clone();
        catalog.register(
            Operation::constructor(bar.clone(), [], move |_, _| Ok(Value::new_object(t.clone())))
                .unwrap(),
        );
        catalog.register(
            Operation::method(foo.clone(), "bar", [], int.clone(), |args, _| {
                count_of(&args[0]).map(Value::Int)
            })
            .unwrap(),
        );
        let t = foo.clone();
        catalog.register(
            Operation::static_method(foo.clone(), "make", [], foo.clone(), move |_, _| {
                Ok(Value::new_object(t.clone()))
            })
            .unwrap(),
        );
        catalog.register(
            Operation::static_method(foo.clone(), "none", [], foo.clone(), |_, _| Ok(Value::Null))
                .unwrap(),
        );
        catalog.register(
            Operation::method(foo.clone(), "boom", [], Type::void(), |_, _| panic!("boom"))
                .unwrap(),
        );
        catalog.register(
            Operation::static_method(foo.clone(), "fail", [], int.clone(), |_, _| {
                Err(Fault::new("IllegalState", "always fails"))
            })
            .unwrap(),
        );
        catalog.register(
            Operation::method(foo.clone(), "add", [int.clone()], Type::void(), |args, _| {
                let count = count_of(&args[0])?;
                let n = args[1].as_int().unwrap_or(0);
                if let Some(o) = args[0].as_object() {
                    o.set_field("count", Value::Int(count.wrapping_add(n)));
                }
                Ok(Value::Null)
            })
            .unwrap(),
        );
        catalog.register(
            Operation::static_method(foo.clone(), "shout", [Type::string()], Type::void(), |args, out| {
                let text = args[0].as_str().unwrap_or("null").to_uppercase();
                let _ = writeln!(out, "{text}");
                Ok(Value::Null)
            })
            .unwrap(),
        );
        catalog.register(
            Operation::method(bar.clone(), "baz", [foo.clone()], Type::string(), |args, _| {
                let n = count_of(&args[1])?;
                Ok(Value::str(&format!("baz{n}")))
            })
            .unwrap(),
        );
        catalog.register(
            Operation::static_method(
                foo.clone(),
                "sum",
                [Type::array(int.clone())],
                int.clone(),
                |args, _| {
                    let a = args[0]
                        .as_array()
                        .ok_or_else(|| Fault::null_reference("Foo.sum"))?;
                    let sum = a
                        .elements()
                        .iter()
                        .filter_map(Value::as_int)
                        .fold(0i32, i32::wrapping_add);
                    Ok(Value::Int(sum))
                },
            )
            .unwrap(),
        );
        catalog.register(
            Operation::static_method(
                foo.clone(),
                "max",
                [int.clone(), int.clone()],
                int.clone(),
                |args, _| {
                    let a = args[0].as_int().unwrap_or(0);
                    let b = args[1].as_int().unwrap_or(0);
                    Ok(Value::Int(a.max(b)))
                },
            )
            .unwrap(),
        );
        catalog.register_field(Field::instance(foo.clone(), "count", int.clone()));
        catalog.register_field(Field::static_field(foo.clone(), "instances", int));

        Self {
            catalog,
            shape,
            foo,
            bar,
            color,
        }
    }

    /// Registered operation with descriptor `desc`.
    pub(crate) fn op(&self, desc: &str) -> Operation {
        self.catalog.parse_operation(desc).unwrap()
    }

    /// `int int0 = 7; Foo foo1 = new Foo(int0);`
    pub(crate) fn foo_sequence(&self) -> Sequence {
        let s = Sequence::for_primitive(Value::Int(7)).unwrap();
        s.extend(self.op("cons : Foo.<init>(int)"), &[s.variable(0).unwrap()])
            .unwrap()
    }

    /// `Bar bar0 = new Bar();`
    pub(crate) fn bar_sequence(&self) -> Sequence {
        Sequence::new()
            .extend(self.op("cons : Bar.<init>()"), &[])
            .unwrap()
    }

    /// `Foo foo0 = new Foo(); foo0.boom();`
    pub(crate) fn boom_sequence(&self) -> Sequence {
        let s = Sequence::new()
            .extend(self.op("cons : Foo.<init>()"), &[])
            .unwrap();
        s.extend(self.op("method : Foo.boom()"), &[s.variable(0).unwrap()])
            .unwrap()
    }

    /// Registered operations with an input that accepts `ty`, by descriptor.
    pub(crate) fn ops_accepting(&self, ty: &Type) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .catalog
            .operations()
            .filter(|op| op.input_types().iter().any(|t| t.is_assignable_from(ty)))
            .cloned()
            .collect();
        ops.sort_by_key(Operation::to_parsable_string);
        ops
    }

    fn any_structural(&self, src: &mut Source) -> Operation {
        match src.any_of("kind", make::int_in_range(0..6u8)) {
            0 => Operation::literal(Type::int(), Value::Int(src.any("int"))).unwrap(),
            1 => {
                let s: String = src.any("str");
                Operation::literal(Type::string(), Value::str(&s)).unwrap()
            }
            2 => Operation::literal(Type::boolean(), Value::Bool(src.any("bool"))).unwrap(),
            3 => Operation::literal(self.foo.clone(), Value::Null).unwrap(),
            4 => {
                let name = if src.any("red") { "RED" } else { "GREEN" };
                Operation::enum_constant(self.color.clone(), name).unwrap()
            }
            _ => {
                let len = src.any_of("len", make::int_in_range(0..3usize));
                Operation::array_creation(Type::int(), len).unwrap()
            }
        }
    }

    /// Random well-formed sequence over the catalog and structural operations.
    pub(crate) fn any_sequence(&self, src: &mut Source) -> Sequence {
        let mut ops: Vec<Operation> = self.catalog.operations().cloned().collect();
        ops.sort_by_key(Operation::to_parsable_string);
        let mut rng = Rand::new(src.any("seed"));
        let mut s = Sequence::new();
        let steps = src.any_of("steps", make::int_in_range(0..8usize));
        for _ in 0..steps {
            let op = if src.any("structural") {
                self.any_structural(src)
            } else {
                match src.choose("op", &ops) {
                    Some((op, _)) => op.clone(),
                    None => continue,
                }
            };
            let inputs: Result<Vec<Variable<'_>>, _> = op
                .input_types()
                .iter()
                .map(|t| s.random_variable_for_type(t, false, &mut rng))
                .collect();
            let Ok(inputs) = inputs else {
                continue;
            };
            let next = s.extend(op, &inputs).unwrap();
            s = next;
        }
        s
    }
}
