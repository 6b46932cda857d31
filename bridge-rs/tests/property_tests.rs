use proptest::prelude::*;
use scriptbridge::dialog::RowComposer;
use scriptbridge::gui::DisplayType;
use scriptbridge::Value;

fn display_type() -> impl Strategy<Value = DisplayType> {
    prop_oneof![Just(DisplayType::Inherit), Just(DisplayType::Block), Just(DisplayType::Inline)]
}

/// A sequence of widgets (by hint) with `true` marking an `addBreak` before it.
fn script() -> impl Strategy<Value = Vec<(DisplayType, bool)>> {
    prop::collection::vec((display_type(), prop::bool::weighted(0.15)), 0..40)
}

fn compose(items: &[(DisplayType, bool)]) -> RowComposer<usize> {
    let mut c = RowComposer::new();
    for (i, &(hint, brk)) in items.iter().enumerate() {
        if brk {
            c.add_break();
        }
        c.push(i, hint);
    }
    c
}

proptest! {
    /// Every widget is placed exactly once, in the order it was added.
    #[test]
    fn every_item_placed_once_in_order(items in script()) {
        let c = compose(&items);
        let placed: Vec<usize> = c.layout().into_iter().map(|(i, _)| *i).collect();
        prop_assert_eq!(placed, (0..items.len()).collect::<Vec<_>>());
    }

    /// Each row fills exactly `max_columns` columns.
    #[test]
    fn rows_fill_the_grid(items in script()) {
        let c = compose(&items);
        let max = c.max_columns();
        let layout = c.layout();
        for r in 0..c.rows().len() {
            let cells: Vec<_> = layout.iter().filter(|(_, p)| p.row == r).collect();
            prop_assert!(!cells.is_empty());
            let width: usize = cells.iter().map(|(_, p)| p.span).sum();
            prop_assert_eq!(width, max);
            for (k, (_, p)) in cells.iter().enumerate() {
                prop_assert_eq!(p.column, k);
                if k + 1 < cells.len() {
                    prop_assert_eq!(p.span, 1);
                }
            }
        }
    }

    /// With no hints and no breaks every widget gets a row of its own.
    #[test]
    fn inherit_from_start_is_one_per_row(n in 0usize..30) {
        let c = compose(&vec![(DisplayType::Inherit, false); n]);
        prop_assert_eq!(c.rows().len(), n);
        prop_assert!(c.max_columns() == 1);
    }

    /// A break always starts a new row.
    #[test]
    fn break_starts_a_row(items in script()) {
        let c = compose(&items);
        let layout = c.layout();
        for (i, &(_, brk)) in items.iter().enumerate().skip(1) {
            if brk {
                prop_assert_eq!(layout[i].1.column, 0);
            }
        }
    }

    /// Removing an item keeps the rest in order and drops empty rows.
    #[test]
    fn remove_keeps_order(items in script(), pick in any::<prop::sample::Index>()) {
        prop_assume!(!items.is_empty());
        let mut c = compose(&items);
        let victim = pick.index(items.len());
        prop_assert_eq!(c.remove(|&i| i == victim), Some(victim));
        prop_assert!(c.rows().iter().all(|r| !r.is_empty()));
        let rest: Vec<usize> = c.layout().into_iter().map(|(i, _)| *i).collect();
        let expected: Vec<usize> = (0..items.len()).filter(|&i| i != victim).collect();
        prop_assert_eq!(rest, expected);
    }

    /// Display types survive their textual form.
    #[test]
    fn display_type_text(hint in display_type()) {
        prop_assert_eq!(hint.as_str().parse::<DisplayType>(), Ok(hint));
    }
}

fn doubles() -> impl Strategy<Value = f64> {
    any::<f64>().prop_filter("NaN never compares equal", |x| !x.is_nan())
}

#[cfg(feature = "lua")]
mod lua {
    use super::*;
    use mlua::Lua;
    use scriptbridge::lua::{to_guest_value, to_host_value};

    fn round_trip(value: &Value) -> Value {
        let lua = Lua::new();
        let guest = to_guest_value(&lua, value).unwrap();
        to_host_value(&guest)
    }

    proptest! {
        #[test]
        fn ints(n in any::<i32>()) {
            prop_assert_eq!(round_trip(&Value::Int(n)), Value::Int(n));
        }

        #[test]
        fn any_double(x in doubles()) {
            prop_assert_eq!(round_trip(&Value::Double(x)), Value::Double(x));
        }

        #[test]
        fn whole_doubles(n in any::<i32>()) {
            prop_assert_eq!(round_trip(&Value::Double(n.into())), Value::Double(n.into()));
        }

        #[test]
        fn strings(s in "\\PC*") {
            prop_assert_eq!(round_trip(&Value::from(s.as_str())), Value::Str(s));
        }
    }
}

#[cfg(feature = "js")]
mod js {
    use super::*;
    use rquickjs::{Context, Runtime};
    use scriptbridge::js::{to_guest_value, to_host_value};

    fn round_trip(value: &Value) -> Value {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            let guest = to_guest_value(&ctx, value).unwrap();
            to_host_value(&guest)
        })
    }

    proptest! {
        #[test]
        fn ints(n in any::<i32>()) {
            prop_assert_eq!(round_trip(&Value::Int(n)), Value::Int(n));
        }

        #[test]
        fn any_double(x in doubles()) {
            prop_assert_eq!(round_trip(&Value::Double(x)), Value::Double(x));
        }

        #[test]
        fn whole_doubles(n in any::<i32>()) {
            prop_assert_eq!(round_trip(&Value::Double(n.into())), Value::Double(n.into()));
        }

        #[test]
        fn strings(s in "\\PC*") {
            prop_assert_eq!(round_trip(&Value::from(s.as_str())), Value::Str(s));
        }
    }
}
