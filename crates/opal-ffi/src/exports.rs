//! Export table: canonical symbol name to entry point
//!
//! Symbols follow `module__operation[__descriptor...]`, one entry per
//! supported instantiation. The table is built once on first lookup.

use std::collections::HashMap;
use std::ffi::{c_char, CStr};
use std::sync::OnceLock;

use opal_core::traits::Element;
use opal_core::{symbol_name, Type};

use crate::comb::{basic_composition, fix_delta, population_amplification};
use crate::core::{
    curve_epsilon, make_chain_mt_entry, make_chain_tt_entry, measurement_check,
    measurement_describe, measurement_free, measurement_invoke, measurement_map,
    transformation_check, transformation_describe, transformation_free, transformation_invoke,
    transformation_map,
};
use crate::data::{
    object_as_slice, object_free, object_to_string, object_type, slice_as_object, slice_free,
    str_free,
};
use crate::meas::{make_base_gaussian, make_base_geometric, make_base_laplace};
use crate::trans::{make_bounded_mean, make_bounded_sum, make_clamp, make_count, make_identity};
use crate::types::RawEntry;

type Table = HashMap<String, RawEntry>;

static EXPORTS: OnceLock<Table> = OnceLock::new();

fn plain(table: &mut Table, module: &str, operation: &str, entry: RawEntry) {
    table.insert(symbol_name(module, operation, &[]), entry);
}

fn typed<T: Element>(table: &mut Table, module: &str, operation: &str, entry: RawEntry) {
    table.insert(symbol_name(module, operation, &[T::type_()]), entry);
}

macro_rules! floats {
    ($table:expr, $module:literal, $operation:literal, $entry:ident) => {
        typed::<f32>($table, $module, $operation, $entry::<f32>);
        typed::<f64>($table, $module, $operation, $entry::<f64>);
    };
}

macro_rules! integers {
    ($table:expr, $module:literal, $operation:literal, $entry:ident) => {
        typed::<i32>($table, $module, $operation, $entry::<i32>);
        typed::<i64>($table, $module, $operation, $entry::<i64>);
        typed::<u32>($table, $module, $operation, $entry::<u32>);
        typed::<u64>($table, $module, $operation, $entry::<u64>);
    };
}

macro_rules! primitives {
    ($table:expr, $module:literal, $operation:literal, $entry:ident) => {
        typed::<bool>($table, $module, $operation, $entry::<bool>);
        integers!($table, $module, $operation, $entry);
        floats!($table, $module, $operation, $entry);
    };
}

fn register_float_combinations<T: Element>(
    table: &mut Table,
    mean: RawEntry,
    fix_delta: RawEntry,
) {
    let carrier = T::type_();
    for input_metric in ["SymmetricDistance", "HammingDistance"] {
        for output_metric in ["L1Sensitivity", "L2Sensitivity"] {
            let descriptors = [
                Type::named(input_metric),
                Type::generic(output_metric, vec![carrier.clone()]),
            ];
            table.insert(symbol_name("trans", "make_bounded_mean", &descriptors), mean);
        }
    }

    let amplification = [
        Type::generic("IntervalDomain", vec![carrier.clone()]),
        Type::generic("MaxDivergence", vec![carrier.clone()]),
    ];
    table.insert(
        symbol_name("comb", "make_population_amplification", &amplification),
        population_amplification,
    );

    let curve = [Type::generic("SmoothedMaxDivergence", vec![carrier])];
    table.insert(symbol_name("comb", "make_fix_delta", &curve), fix_delta);
}

fn build() -> Table {
    let mut table = Table::new();
    let t = &mut table;

    plain(t, "data", "slice_as_object", slice_as_object);
    plain(t, "data", "object_type", object_type);
    plain(t, "data", "object_as_slice", object_as_slice);
    plain(t, "data", "to_string", object_to_string);
    plain(t, "data", "slice_free", slice_free);
    plain(t, "data", "object_free", object_free);
    plain(t, "data", "str_free", str_free);

    plain(t, "core", "transformation_invoke", transformation_invoke);
    plain(t, "core", "transformation_map", transformation_map);
    plain(t, "core", "transformation_check", transformation_check);
    plain(t, "core", "transformation_describe", transformation_describe);
    plain(t, "core", "transformation_free", transformation_free);
    plain(t, "core", "measurement_invoke", measurement_invoke);
    plain(t, "core", "measurement_map", measurement_map);
    plain(t, "core", "measurement_check", measurement_check);
    plain(t, "core", "measurement_describe", measurement_describe);
    plain(t, "core", "measurement_free", measurement_free);
    plain(t, "core", "make_chain_tt", make_chain_tt_entry);
    plain(t, "core", "make_chain_mt", make_chain_mt_entry);
    plain(t, "core", "curve_epsilon", curve_epsilon);

    primitives!(t, "trans", "make_identity", make_identity);
    integers!(t, "trans", "make_clamp", make_clamp);
    floats!(t, "trans", "make_clamp", make_clamp);
    floats!(t, "trans", "make_bounded_sum", make_bounded_sum);
    primitives!(t, "trans", "make_count", make_count);
    typed::<String>(t, "trans", "make_count", make_count::<String>);

    floats!(t, "meas", "make_base_laplace", make_base_laplace);
    floats!(t, "meas", "make_base_gaussian", make_base_gaussian);
    integers!(t, "meas", "make_base_geometric", make_base_geometric);

    plain(t, "comb", "make_basic_composition", basic_composition);
    register_float_combinations::<f32>(t, make_bounded_mean::<f32>, fix_delta::<f32>);
    register_float_combinations::<f64>(t, make_bounded_mean::<f64>, fix_delta::<f64>);

    tracing::debug!(entries = table.len(), "export table built");
    table
}

fn exports() -> &'static Table {
    EXPORTS.get_or_init(build)
}

/// Entry point registered under `symbol`
pub fn lookup(symbol: &str) -> Option<RawEntry> {
    exports().get(symbol).copied()
}

/// All registered symbols, sorted
pub fn symbols() -> Vec<&'static str> {
    let mut symbols: Vec<&'static str> = exports().keys().map(String::as_str).collect();
    symbols.sort_unstable();
    symbols
}

/// Find an entry point by its symbol name
/// Returns NULL if no such instantiation exists
#[no_mangle]
pub unsafe extern "C" fn opal_lookup(symbol: *const c_char) -> Option<RawEntry> {
    if symbol.is_null() {
        return None;
    }
    CStr::from_ptr(symbol).to_str().ok().and_then(lookup)
}
