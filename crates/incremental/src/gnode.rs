//! The gnode: ingestion, diffing and context notification for one table.
//!
//! A processing step drains one input port and runs:
//!
//! 1. flatten the input to one row per primary key
//! 2. look every key up in the stored state
//! 3. diff each master column (in parallel once there are enough columns)
//! 4. re-evaluate computed columns over the rows whose inputs changed
//! 5. commit the `current` images to the stored state
//! 6. notify every registered context, unless nothing changed
//!
//! The six output tables are row-aligned with the flattened table and stay
//! readable through [`Gnode::output`] until the next step.

use crate::arena::{ContextArena, ContextHandle};
use crate::computed::ComputedColumn;
use crate::diff::{dense_column, diff_all, is_change, ColumnDiff, DiffJob, RowPlan};
use crate::flatten::{flatten, Flattened};
use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;
use rill_context::{Context, NotifyTables, ViewConfig, PSP_EXISTED};
use rill_core::{
    Column, DataTable, DataType, Error, InvariantViolation, OpCode, Result, Scalar, Schema,
    PSP_OP, PSP_PKEY,
};
use rill_storage::{GState, Port, PortRole};

/// Tuning knobs of a gnode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GnodeOptions {
    /// Minimum number of diffed columns before the diff runs on the rayon
    /// pool. Ignored without the `parallel` feature.
    pub parallel_threshold: usize,
}

impl Default for GnodeOptions {
    fn default() -> Self {
        Self {
            parallel_threshold: 16,
        }
    }
}

impl GnodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parallel_threshold(mut self, columns: usize) -> Self {
        self.parallel_threshold = columns;
        self
    }
}

/// Lifecycle of a gnode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GnodeState {
    Uninitialized,
    Idle,
    Processing,
    /// An invariant violation escaped a step; every later call is refused.
    Faulted,
}

/// Outcome of one processing step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProcessResult {
    /// Number of flattened rows (distinct keys touched).
    pub flattened: usize,
    /// Whether any cell changed; contexts were notified only if true.
    pub should_notify: bool,
}

/// The output tables of the last step.
#[derive(Clone, Debug)]
struct StepTables {
    flattened: DataTable,
    delta: DataTable,
    prev: DataTable,
    current: DataTable,
    transitions: DataTable,
    existed: DataTable,
}

impl StepTables {
    fn empty(master: &Schema, flat: &Schema) -> Result<Self> {
        let delta: Vec<_> = master.iter().map(|(n, t)| (n, t.delta_type())).collect();
        let codes: Vec<_> = master.iter().map(|(n, _)| (n, DataType::UInt8)).collect();
        Ok(Self {
            flattened: DataTable::new(flat),
            delta: DataTable::new(&Schema::from_pairs(&delta)?),
            prev: DataTable::new(master),
            current: DataTable::new(master),
            transitions: DataTable::new(&Schema::from_pairs(&codes)?),
            existed: DataTable::new(&Schema::from_pairs(&[(PSP_EXISTED, DataType::Bool)])?),
        })
    }

    fn get(&self, role: PortRole) -> &DataTable {
        match role {
            PortRole::Flattened => &self.flattened,
            PortRole::Delta => &self.delta,
            PortRole::Prev => &self.prev,
            PortRole::Current => &self.current,
            PortRole::Transitions => &self.transitions,
            PortRole::Existed => &self.existed,
        }
    }

    fn notify(&self) -> NotifyTables<'_> {
        NotifyTables {
            flattened: &self.flattened,
            delta: &self.delta,
            prev: &self.prev,
            current: &self.current,
            transitions: &self.transitions,
            existed: &self.existed,
        }
    }
}

/// Diff engine of one table.
#[derive(Debug)]
pub struct Gnode {
    input_schema: Schema,
    output_schema: Schema,
    flat_schema: Schema,
    options: GnodeOptions,
    state: GnodeState,
    gstate: GState,
    ports: Vec<Port>,
    outputs: StepTables,
    computed: Vec<ComputedColumn>,
    contexts: ContextArena,
}

fn flat_schema(master: &Schema) -> Result<Schema> {
    let mut flat = master.clone();
    flat.add_column(PSP_OP, DataType::UInt8)?;
    Ok(flat)
}

impl Gnode {
    /// Creates a gnode. `input_schema` is `output_schema` plus `psp_pkey`
    /// and a `UInt8` `psp_op` column.
    pub fn new(input_schema: Schema, output_schema: Schema, options: GnodeOptions) -> Result<Self> {
        let pkey_dtype = input_schema.dtype_of(PSP_PKEY)?;
        if input_schema.dtype_of(PSP_OP)? != DataType::UInt8 {
            return Err(Error::invalid_config("psp_op must be a uint8 column"));
        }
        let output_schema = output_schema.without_internal();
        for (name, dtype) in output_schema.iter() {
            let declared = input_schema.dtype_of(name)?;
            if declared != dtype {
                return Err(Error::type_mismatch(dtype, declared));
            }
        }
        let gstate = GState::new(&output_schema, pkey_dtype)?;
        let flat = flat_schema(gstate.schema())?;
        let outputs = StepTables::empty(gstate.schema(), &flat)?;
        Ok(Self {
            input_schema,
            output_schema,
            flat_schema: flat,
            options,
            state: GnodeState::Uninitialized,
            gstate,
            ports: Vec::new(),
            outputs,
            computed: Vec::new(),
            contexts: ContextArena::new(),
        })
    }

    /// Opens the default input port (port 0).
    pub fn init(&mut self) -> Result<()> {
        match self.state {
            GnodeState::Uninitialized => {
                self.ports.push(Port::new(self.input_schema.clone()));
                self.state = GnodeState::Idle;
                Ok(())
            }
            GnodeState::Faulted => Err(InvariantViolation::Faulted.into()),
            _ => Ok(()),
        }
    }

    fn ready(&self) -> Result<()> {
        match self.state {
            GnodeState::Idle => Ok(()),
            GnodeState::Uninitialized => Err(InvariantViolation::NotInitialized.into()),
            GnodeState::Faulted => Err(InvariantViolation::Faulted.into()),
            GnodeState::Processing => Err(Error::invalid_operation("gnode is processing")),
        }
    }

    /// Records an invariant violation as a fault.
    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            if err.is_invariant() {
                log::error!("gnode faulted: {}", err);
                self.state = GnodeState::Faulted;
            }
        }
        result
    }

    /// Marks the gnode faulted. Used by callers that detect a violation
    /// outside of a step.
    pub fn mark_faulted(&mut self) {
        self.state = GnodeState::Faulted;
    }

    pub fn state(&self) -> GnodeState {
        self.state
    }

    pub fn options(&self) -> &GnodeOptions {
        &self.options
    }

    /// Opens an additional input port and returns its id.
    pub fn make_input_port(&mut self) -> Result<usize> {
        self.ready()?;
        self.ports.push(Port::new(self.input_schema.clone()));
        Ok(self.ports.len() - 1)
    }

    pub fn num_ports(&self) -> usize {
        self.ports.len()
    }

    fn port_mut(&mut self, port: usize) -> Result<&mut Port> {
        self.ports
            .get_mut(port)
            .ok_or_else(|| Error::invalid_operation(format!("no input port {}", port)))
    }

    /// Queues a fragment on `port`. Its schema must equal the input schema.
    pub fn send(&mut self, port: usize, fragment: DataTable) -> Result<()> {
        self.ready()?;
        let result = self.port_mut(port).and_then(|p| p.push(fragment));
        self.guard(result)
    }

    /// Drains `port` and runs one processing step.
    pub fn process(&mut self, port: usize) -> Result<ProcessResult> {
        self.ready()?;
        self.state = GnodeState::Processing;
        let result = self.step(port);
        self.state = GnodeState::Idle;
        self.guard(result)
    }

    fn step(&mut self, port: usize) -> Result<ProcessResult> {
        let input = self.port_mut(port)?.drain()?;
        let flat = flatten(&input, &self.gstate, &self.flat_schema)?;
        let plan: Vec<RowPlan> = flat
            .pkeys
            .iter()
            .zip(flat.ops.iter().zip(&flat.reset))
            .map(|(pkey, (&op, &reset))| {
                let lookup = self.gstate.lookup(pkey);
                RowPlan {
                    op,
                    pre_existed: lookup.exists,
                    slot: lookup.idx,
                    reset,
                }
            })
            .collect();

        let (columns, changed) = self.diff(&flat, &plan)?;
        let keys_moved = plan
            .iter()
            .any(|row| row.pre_existed != row.exists_after());
        let should_notify = changed || keys_moved;

        let step = self.assemble(flat, &plan, columns)?;
        self.commit(&step, &plan)?;
        self.outputs = step;
        let reclaimed = self.gstate.collect_vocab();
        if reclaimed > 0 {
            log::trace!("reclaimed {} vocabulary entries", reclaimed);
        }

        log::debug!(
            "processed {} input rows as {} keys, notify: {}",
            input.size(),
            plan.len(),
            should_notify
        );

        if should_notify {
            let tables = self.outputs.notify();
            for context in self.contexts.iter_mut() {
                context.notify(&tables)?;
            }
        }
        Ok(ProcessResult {
            flattened: plan.len(),
            should_notify,
        })
    }

    fn is_computed(&self, name: &str) -> bool {
        self.computed.iter().any(|c| c.name == name)
    }

    /// Diffs every master column, returning them in master order and
    /// whether any transition is not a no-op.
    fn diff(&self, flat: &Flattened, plan: &[RowPlan]) -> Result<(Vec<ColumnDiff>, bool)> {
        let master = self.gstate.master();
        let schema = self.gstate.schema();

        let mut jobs = Vec::with_capacity(schema.len());
        let mut targets = Vec::with_capacity(schema.len());
        for (idx, name) in schema.names().iter().enumerate() {
            if self.is_computed(name) {
                continue;
            }
            jobs.push(DiffJob {
                name: name.as_str(),
                stored: master.column_at(idx),
                incoming: flat.table.get_column(name)?,
                authoritative: None,
            });
            targets.push(idx);
        }
        let diffs = diff_all(&jobs, plan, self.options.parallel_threshold)?;

        let mut slots: Vec<Option<ColumnDiff>> = (0..schema.len()).map(|_| None).collect();
        for (idx, diff) in targets.into_iter().zip(diffs) {
            slots[idx] = Some(diff);
        }

        for column in &self.computed {
            let idx = schema
                .get_index(&column.name)
                .ok_or_else(|| Error::column_not_found(column.name.as_str()))?;
            let stored = master.column_at(idx);
            let (incoming, authoritative) = evaluate(column, stored.dtype(), plan, schema, &slots)?;
            let diff = DiffJob {
                name: column.name.as_str(),
                stored,
                incoming: &incoming,
                authoritative: Some(authoritative.as_slice()),
            }
            .run(plan)?;
            slots[idx] = Some(diff);
        }

        let mut columns = Vec::with_capacity(slots.len());
        let mut changed = false;
        for (idx, slot) in slots.into_iter().enumerate() {
            let diff = slot.ok_or_else(|| Error::column_not_found(schema.names()[idx].as_str()))?;
            changed |= diff.any_change();
            columns.push(diff);
        }
        Ok((columns, changed))
    }

    fn assemble(&self, flat: Flattened, plan: &[RowPlan], columns: Vec<ColumnDiff>) -> Result<StepTables> {
        let names = self.gstate.schema().names();
        let mut prev = Vec::with_capacity(names.len());
        let mut current = Vec::with_capacity(names.len());
        let mut delta = Vec::with_capacity(names.len());
        let mut transitions = Vec::with_capacity(names.len());
        for (name, diff) in names.iter().zip(columns) {
            prev.push((name.clone(), diff.prev));
            current.push((name.clone(), diff.current));
            delta.push((name.clone(), diff.delta));
            transitions.push((name.clone(), diff.transitions));
        }
        let existed = dense_column(DataType::Bool, plan.iter().map(RowPlan::existed).collect());
        Ok(StepTables {
            flattened: flat.table,
            delta: DataTable::from_columns(delta)?,
            prev: DataTable::from_columns(prev)?,
            current: DataTable::from_columns(current)?,
            transitions: DataTable::from_columns(transitions)?,
            existed: DataTable::from_columns(vec![(String::from(PSP_EXISTED), existed)])?,
        })
    }

    fn commit(&mut self, step: &StepTables, plan: &[RowPlan]) -> Result<()> {
        let pkeys = step.flattened.get_column(PSP_PKEY)?;
        self.gstate.check_source(&step.current)?;
        for (row, entry) in plan.iter().enumerate() {
            let pkey = pkeys.get_scalar(row);
            match entry.op {
                OpCode::Delete => {
                    self.gstate.tombstone(&pkey);
                }
                _ => {
                    self.gstate.upsert(&pkey, &step.current, row)?;
                }
            }
        }
        Ok(())
    }

    /// Re-types a column everywhere it is stored and rebuilds every
    /// context from the stored state.
    pub fn promote_column(&mut self, name: &str, dtype: DataType) -> Result<()> {
        self.ready()?;
        if self.is_computed(name) {
            return Err(Error::invalid_operation(format!(
                "cannot promote computed column {}",
                name
            )));
        }
        let from = self.gstate.schema().dtype_of(name)?;
        if from == dtype {
            return Ok(());
        }
        if !from.can_promote_to(dtype) {
            return Err(InvariantViolation::NoPromotionPath { from, to: dtype }.into());
        }
        let result = self.promote_everywhere(name, dtype);
        self.guard(result)?;
        log::info!("promoted column {} from {:?} to {:?}", name, from, dtype);
        Ok(())
    }

    fn promote_everywhere(&mut self, name: &str, dtype: DataType) -> Result<()> {
        self.gstate.promote_column(name, dtype)?;
        for port in &mut self.ports {
            port.promote_column(name, dtype)?;
        }
        self.input_schema.retype(name, dtype)?;
        self.output_schema.retype(name, dtype)?;
        self.flat_schema = flat_schema(self.gstate.schema())?;
        self.outputs = StepTables::empty(self.gstate.schema(), &self.flat_schema)?;
        self.rebuild_contexts()
    }

    /// Declares computed columns, fills them for every stored row and
    /// rebuilds every context.
    ///
    /// All columns are validated before any state changes.
    pub fn add_computed_columns(&mut self, columns: Vec<ComputedColumn>) -> Result<()> {
        self.ready()?;
        let mut schema = self.gstate.schema().clone();
        let mut types = Vec::with_capacity(columns.len());
        for column in &columns {
            let dtype = column.output_type(&schema)?;
            schema.add_column(&column.name, dtype)?;
            types.push(dtype);
        }

        for (column, dtype) in columns.iter().zip(types) {
            self.gstate.add_column(&column.name, dtype)?;
            self.output_schema.add_column(&column.name, dtype)?;
            self.backfill(column)?;
            log::info!(
                "added computed column {} = {}({})",
                column.name,
                column.function.name(),
                column.inputs.join(", ")
            );
        }
        self.computed.extend(columns);
        self.flat_schema = flat_schema(self.gstate.schema())?;
        self.outputs = StepTables::empty(self.gstate.schema(), &self.flat_schema)?;
        self.rebuild_contexts()
    }

    fn backfill(&mut self, column: &ComputedColumn) -> Result<()> {
        for slot in self.gstate.live_slots() {
            let args = column
                .inputs
                .iter()
                .map(|input| self.gstate.read_slot(slot, input))
                .collect::<Result<Vec<_>>>()?;
            let value = column.function.apply(&args);
            if value.is_valid() {
                self.gstate.set_slot(slot, &column.name, &value)?;
            }
        }
        Ok(())
    }

    pub fn computed_columns(&self) -> &[ComputedColumn] {
        &self.computed
    }

    fn rebuild_contexts(&mut self) -> Result<()> {
        for context in self.contexts.iter_mut() {
            context.rebuild(&self.gstate)?;
        }
        Ok(())
    }

    /// Creates a context for `view`, loads the stored rows into it and
    /// registers it under `name`.
    pub fn register_context(&mut self, name: &str, view: &ViewConfig) -> Result<ContextHandle> {
        if self.state == GnodeState::Faulted {
            return Err(InvariantViolation::Faulted.into());
        }
        let mut context = Context::new(view, self.gstate.schema())?;
        context.notify_initial(&self.gstate.snapshot())?;
        let sides = context.sides();
        let handle = self.contexts.register(name, context)?;
        log::info!("registered context {} with {} pivot sides", name, sides);
        Ok(handle)
    }

    pub fn unregister_context(&mut self, handle: ContextHandle) -> Result<()> {
        let name = String::from(self.contexts.name_of(handle)?);
        self.contexts.unregister(handle)?;
        log::info!("unregistered context {}", name);
        Ok(())
    }

    pub fn context(&self, handle: ContextHandle) -> Result<&Context> {
        self.contexts.get(handle)
    }

    pub fn context_mut(&mut self, handle: ContextHandle) -> Result<&mut Context> {
        self.contexts.get_mut(handle)
    }

    /// A context together with the stored state it reads row data from.
    pub fn context_with_state(&mut self, handle: ContextHandle) -> Result<(&mut Context, &GState)> {
        let context = self.contexts.get_mut(handle)?;
        Ok((context, &self.gstate))
    }

    pub fn find_context(&self, name: &str) -> Option<ContextHandle> {
        self.contexts.find(name)
    }

    pub fn num_contexts(&self) -> usize {
        self.contexts.len()
    }

    /// Drops every stored row and queued fragment; contexts become empty.
    pub fn reset(&mut self) -> Result<()> {
        self.ready()?;
        self.gstate.reset();
        for port in &mut self.ports {
            port.clear();
        }
        self.outputs = StepTables::empty(self.gstate.schema(), &self.flat_schema)?;
        self.rebuild_contexts()
    }

    pub fn output(&self, role: PortRole) -> &DataTable {
        self.outputs.get(role)
    }

    pub fn gstate(&self) -> &GState {
        &self.gstate
    }

    /// Snapshot of the live master rows.
    pub fn get_table(&self) -> DataTable {
        self.gstate.snapshot()
    }

    pub fn get_pkeys(&self) -> Vec<Scalar> {
        self.gstate.get_pkeys()
    }

    pub fn has_pkey(&self, pkey: &Scalar) -> bool {
        self.gstate.has_pkey(pkey)
    }

    pub fn has_pkeys(&self, pkeys: &[Scalar]) -> Vec<bool> {
        self.gstate.has_pkeys(pkeys)
    }

    pub fn num_rows(&self) -> usize {
        self.gstate.num_rows()
    }

    pub fn input_schema(&self) -> &Schema {
        &self.input_schema
    }

    /// User-visible columns, computed columns included.
    pub fn output_schema(&self) -> &Schema {
        &self.output_schema
    }

    /// Master schema: output columns plus `psp_pkey`.
    pub fn master_schema(&self) -> &Schema {
        self.gstate.schema()
    }
}

/// Evaluates `column` over the rows that need it: written rows that are new,
/// reset or have an input whose transition is not a no-op. Returns the
/// incoming cells and the rows they are authoritative for.
fn evaluate(
    column: &ComputedColumn,
    dtype: DataType,
    plan: &[RowPlan],
    schema: &Schema,
    slots: &[Option<ColumnDiff>],
) -> Result<(Column, Vec<bool>)> {
    let inputs = column
        .inputs
        .iter()
        .map(|name| {
            schema
                .get_index(name)
                .and_then(|idx| slots[idx].as_ref())
                .ok_or_else(|| Error::column_not_found(name.as_str()))
        })
        .collect::<Result<Vec<&ColumnDiff>>>()?;
    let codes = inputs
        .iter()
        .map(|diff| diff.transitions.values::<u8>().unwrap_or(&[]))
        .collect::<Vec<_>>();

    let mut out = Column::with_len(dtype, plan.len());
    let mut authoritative = vec![false; plan.len()];
    let mut args = Vec::with_capacity(inputs.len());
    for (row, entry) in plan.iter().enumerate() {
        if !entry.exists_after() {
            continue;
        }
        let touched = entry.reset
            || !entry.pre_existed
            || codes.iter().any(|c| c.get(row).map_or(false, |&code| is_change(code)));
        if !touched {
            continue;
        }
        args.clear();
        args.extend(inputs.iter().map(|diff| diff.current.get_scalar(row)));
        out.set_scalar(row, &column.function.apply(&args))?;
        authoritative[row] = true;
    }
    Ok((out, authoritative))
}
