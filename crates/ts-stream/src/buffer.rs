//! Typed per-field storage.
//!
//! Every schema field gets one [`FieldBuffer`]: a typed [`Column`] plus a
//! logical length. Scalars hold exactly one cell. Arrays keep a backing
//! column pre-sized to `max_count`; only the first `len` cells are
//! meaningful. Backing storage grows on demand and is never shrunk.

use std::collections::HashMap;
use std::fmt;

use crate::error::{Result, StreamError};
use crate::schema::{ElemType, FieldKind, FieldSpec, Schema};

/// Handle to one buffer of a [`BufferSet`], resolved once at binding time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldId(pub usize);

/// A single untyped cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// `bool`
    Bool(bool),
    /// `int`
    Int(i32),
    /// `uint`
    UInt(u32),
    /// `long`
    Long(i64),
    /// `float`
    Float(f32),
    /// `double`
    Double(f64),
    /// `string`
    Str(String),
}

enum Num {
    I(i64),
    F(f64),
}

impl Value {
    /// Element type of this value.
    pub fn elem(&self) -> ElemType {
        match self {
            Value::Bool(_) => ElemType::Bool,
            Value::Int(_) => ElemType::Int,
            Value::UInt(_) => ElemType::UInt,
            Value::Long(_) => ElemType::Long,
            Value::Float(_) => ElemType::Float,
            Value::Double(_) => ElemType::Double,
            Value::Str(_) => ElemType::Str,
        }
    }

    /// Zero value of an element type (empty string for strings).
    pub fn zero(elem: ElemType) -> Self {
        match elem {
            ElemType::Bool => Value::Bool(false),
            ElemType::Int => Value::Int(0),
            ElemType::UInt => Value::UInt(0),
            ElemType::Long => Value::Long(0),
            ElemType::Float => Value::Float(0.0),
            ElemType::Double => Value::Double(0.0),
            ElemType::Str => Value::Str(String::new()),
        }
    }

    fn num(&self) -> Option<Num> {
        Some(match *self {
            Value::Bool(b) => Num::I(b as i64),
            Value::Int(v) => Num::I(v as i64),
            Value::UInt(v) => Num::I(v as i64),
            Value::Long(v) => Num::I(v),
            Value::Float(v) => Num::F(v as f64),
            Value::Double(v) => Num::F(v),
            Value::Str(_) => return None,
        })
    }

    /// Numeric value as `f64`, `None` for strings.
    pub fn as_f64(&self) -> Option<f64> {
        self.num().map(|n| match n {
            Num::I(i) => i as f64,
            Num::F(f) => f,
        })
    }

    /// Convert to another element type: numeric casts with `as`, numeric to
    /// bool by `!= 0`, strings only to strings.
    pub fn cast(self, elem: ElemType) -> Result<Value> {
        if self.elem() == elem {
            return Ok(self);
        }
        let Some(n) = self.num() else {
            return Err(StreamError::TypeMismatch(format!("cannot convert string to {elem}")));
        };
        Ok(match (elem, n) {
            (ElemType::Bool, Num::I(i)) => Value::Bool(i != 0),
            (ElemType::Bool, Num::F(f)) => Value::Bool(f != 0.0),
            (ElemType::Int, Num::I(i)) => Value::Int(i as i32),
            (ElemType::Int, Num::F(f)) => Value::Int(f as i32),
            (ElemType::UInt, Num::I(i)) => Value::UInt(i as u32),
            (ElemType::UInt, Num::F(f)) => Value::UInt(f as u32),
            (ElemType::Long, Num::I(i)) => Value::Long(i),
            (ElemType::Long, Num::F(f)) => Value::Long(f as i64),
            (ElemType::Float, Num::I(i)) => Value::Float(i as f32),
            (ElemType::Float, Num::F(f)) => Value::Float(f as f32),
            (ElemType::Double, Num::I(i)) => Value::Double(i as f64),
            (ElemType::Double, Num::F(f)) => Value::Double(f),
            (ElemType::Str, _) => {
                return Err(StreamError::TypeMismatch(format!(
                    "cannot convert {} to string",
                    self.elem()
                )));
            }
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
        }
    }
}

/// Typed storage for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// `bool`
    Bool(Vec<bool>),
    /// `int`
    Int(Vec<i32>),
    /// `uint`
    UInt(Vec<u32>),
    /// `long`
    Long(Vec<i64>),
    /// `float`
    Float(Vec<f32>),
    /// `double`
    Double(Vec<f64>),
    /// `string`
    Str(Vec<String>),
}

macro_rules! each_column {
    ($col:expr, $v:ident => $body:expr) => {
        match $col {
            Column::Bool($v) => $body,
            Column::Int($v) => $body,
            Column::UInt($v) => $body,
            Column::Long($v) => $body,
            Column::Float($v) => $body,
            Column::Double($v) => $body,
            Column::Str($v) => $body,
        }
    };
}

impl Column {
    /// `n` zero values of `elem`.
    pub fn zeroed(elem: ElemType, n: usize) -> Self {
        match elem {
            ElemType::Bool => Column::Bool(vec![false; n]),
            ElemType::Int => Column::Int(vec![0; n]),
            ElemType::UInt => Column::UInt(vec![0; n]),
            ElemType::Long => Column::Long(vec![0; n]),
            ElemType::Float => Column::Float(vec![0.0; n]),
            ElemType::Double => Column::Double(vec![0.0; n]),
            ElemType::Str => Column::Str(vec![String::new(); n]),
        }
    }

    /// Element type.
    pub fn elem(&self) -> ElemType {
        match self {
            Column::Bool(_) => ElemType::Bool,
            Column::Int(_) => ElemType::Int,
            Column::UInt(_) => ElemType::UInt,
            Column::Long(_) => ElemType::Long,
            Column::Float(_) => ElemType::Float,
            Column::Double(_) => ElemType::Double,
            Column::Str(_) => ElemType::Str,
        }
    }

    /// Number of cells.
    pub fn len(&self) -> usize {
        each_column!(self, v => v.len())
    }

    /// Whether there are no cells.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Grow or truncate, filling new cells with zero values.
    pub fn resize(&mut self, n: usize) {
        each_column!(self, v => v.resize(n, Default::default()))
    }

    /// Reset every cell to its zero value.
    pub fn fill_zero(&mut self) {
        each_column!(self, v => v.iter_mut().for_each(|x| *x = Default::default()))
    }

    /// Reset the cells in `range` to their zero value.
    pub fn zero_cells(&mut self, range: std::ops::Range<usize>) {
        each_column!(self, v => v[range].iter_mut().for_each(|x| *x = Default::default()))
    }

    /// Copy of cell `i`.
    pub fn get(&self, i: usize) -> Option<Value> {
        Some(match self {
            Column::Bool(v) => Value::Bool(*v.get(i)?),
            Column::Int(v) => Value::Int(*v.get(i)?),
            Column::UInt(v) => Value::UInt(*v.get(i)?),
            Column::Long(v) => Value::Long(*v.get(i)?),
            Column::Float(v) => Value::Float(*v.get(i)?),
            Column::Double(v) => Value::Double(*v.get(i)?),
            Column::Str(v) => Value::Str(v.get(i)?.clone()),
        })
    }

    /// Overwrite cell `i`, converting `value` to the column type.
    pub fn set(&mut self, i: usize, value: Value) -> Result<()> {
        let len = self.len();
        if i >= len {
            return Err(StreamError::IndexOutOfRange { name: self.elem().to_string(), index: i, len });
        }
        let value = value.cast(self.elem())?;
        match (self, value) {
            (Column::Bool(v), Value::Bool(x)) => v[i] = x,
            (Column::Int(v), Value::Int(x)) => v[i] = x,
            (Column::UInt(v), Value::UInt(x)) => v[i] = x,
            (Column::Long(v), Value::Long(x)) => v[i] = x,
            (Column::Float(v), Value::Float(x)) => v[i] = x,
            (Column::Double(v), Value::Double(x)) => v[i] = x,
            (Column::Str(v), Value::Str(x)) => v[i] = x,
            (col, value) => {
                return Err(StreamError::TypeMismatch(format!(
                    "{} value in {} column",
                    value.elem(),
                    col.elem()
                )));
            }
        }
        Ok(())
    }

    /// Cells at `indices`, in that order.
    pub fn gather(&self, indices: &[usize]) -> Column {
        each_column!(self, v => Column::from(indices.iter().map(|&i| v[i].clone()).collect::<Vec<_>>()))
    }

    /// Overwrite the first `src.len()` cells with `src`, converting types.
    /// The column must already hold at least that many cells.
    pub fn copy_from(&mut self, src: &Column) -> Result<()> {
        let n = src.len();
        if self.elem() != src.elem() {
            for i in 0..n {
                if let Some(v) = src.get(i) {
                    self.set(i, v)?;
                }
            }
            return Ok(());
        }
        match (self, src) {
            (Column::Bool(d), Column::Bool(s)) => d[..n].copy_from_slice(s),
            (Column::Int(d), Column::Int(s)) => d[..n].copy_from_slice(s),
            (Column::UInt(d), Column::UInt(s)) => d[..n].copy_from_slice(s),
            (Column::Long(d), Column::Long(s)) => d[..n].copy_from_slice(s),
            (Column::Float(d), Column::Float(s)) => d[..n].copy_from_slice(s),
            (Column::Double(d), Column::Double(s)) => d[..n].copy_from_slice(s),
            (Column::Str(d), Column::Str(s)) => d[..n].clone_from_slice(s),
            _ => {}
        }
        Ok(())
    }

    /// First `n` cells as a new column.
    pub fn prefix(&self, n: usize) -> Column {
        each_column!(self, v => Column::from(v[..n.min(v.len())].to_vec()))
    }
}

/// Rust types usable for typed buffer access.
pub trait Element: Clone + Default + fmt::Debug + 'static {
    /// Element type this Rust type maps to.
    const ELEM: ElemType;
    /// Borrow the backing vector when the column has this type.
    fn cells(column: &Column) -> Option<&Vec<Self>>;
    /// Mutable variant of [`Element::cells`].
    fn cells_mut(column: &mut Column) -> Option<&mut Vec<Self>>;
    /// Wrap as an untyped value.
    fn into_value(self) -> Value;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const ELEM: ElemType = ElemType::$variant;

            fn cells(column: &Column) -> Option<&Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn cells_mut(column: &mut Column) -> Option<&mut Vec<Self>> {
                match column {
                    Column::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn into_value(self) -> Value {
                Value::$variant(self)
            }
        }

        impl From<Vec<$t>> for Column {
            fn from(v: Vec<$t>) -> Self {
                Column::$variant(v)
            }
        }
    };
}

impl_element!(bool, Bool);
impl_element!(i32, Int);
impl_element!(u32, UInt);
impl_element!(i64, Long);
impl_element!(f32, Float);
impl_element!(f64, Double);
impl_element!(String, Str);

/// Storage for one schema field.
#[derive(Debug, Clone)]
pub struct FieldBuffer {
    spec: FieldSpec,
    data: Column,
    len: usize,
    counter: Option<FieldId>,
}

impl FieldBuffer {
    fn new(spec: FieldSpec) -> Self {
        let cells = if spec.is_array() { spec.max_count.max(1) } else { 1 };
        let len = if spec.is_array() { 0 } else { 1 };
        let data = Column::zeroed(spec.field_type.elem, cells);
        Self { spec, data, len, counter: None }
    }

    /// Schema row backing this buffer.
    pub fn spec(&self) -> &FieldSpec {
        &self.spec
    }

    /// Unique field name.
    pub fn name(&self) -> &str {
        &self.spec.field_name
    }

    /// Element type of the backing column.
    pub fn elem(&self) -> ElemType {
        self.data.elem()
    }

    /// Length classification.
    pub fn kind(&self) -> FieldKind {
        self.spec.kind()
    }

    /// Whether the field holds an array.
    pub fn is_array(&self) -> bool {
        self.spec.is_array()
    }

    /// Logical length (1 for scalars).
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the logical length is 0.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Backing cells, including those past the logical length.
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Backing column; only the first [`len`](Self::len) cells are meaningful.
    pub fn column(&self) -> &Column {
        &self.data
    }

    /// Counter buffer bounding this array.
    pub fn counter(&self) -> Option<FieldId> {
        self.counter
    }

    /// Restore the zero value and default length.
    pub fn reset(&mut self) {
        self.data.fill_zero();
        self.len = if self.is_array() { 0 } else { 1 };
    }

    /// Set the logical length of an array, growing the backing if needed.
    pub fn set_len(&mut self, n: usize) -> Result<()> {
        if !self.is_array() {
            if n == 1 {
                return Ok(());
            }
            return Err(StreamError::TypeMismatch(format!(
                "{} is a scalar; cannot set length {n}",
                self.spec.field_name
            )));
        }
        if n > self.data.len() {
            log::debug!("growing {} from {} to {n} cells", self.spec.field_name, self.data.len());
            self.data.resize(n);
        }
        self.len = n;
        Ok(())
    }

    /// Replace the logical contents with `stored`, converting element types.
    pub fn load(&mut self, stored: &Column) -> Result<()> {
        let n = stored.len();
        if !self.is_array() && n != 1 {
            return Err(StreamError::Deserialization(format!(
                "scalar {} read {n} values",
                self.spec.field_name
            )));
        }
        self.set_len(n)?;
        self.data.copy_from(stored).map_err(|e| match e {
            StreamError::TypeMismatch(msg) => {
                StreamError::TypeMismatch(format!("{}: {msg}", self.spec.field_name))
            }
            other => other,
        })
    }

    /// Logical contents as a new column.
    pub fn values(&self) -> Column {
        self.data.prefix(self.len)
    }

    /// Cell `i` of the logical contents.
    pub fn value(&self, i: usize) -> Result<Value> {
        if i >= self.len {
            return Err(self.out_of_range(i));
        }
        self.data.get(i).ok_or_else(|| self.out_of_range(i))
    }

    /// Overwrite cell `i` of the logical contents.
    pub fn set_value(&mut self, i: usize, value: Value) -> Result<()> {
        if i >= self.len {
            return Err(self.out_of_range(i));
        }
        self.data.set(i, value)
    }

    /// Scalar value as an integer (counter lengths).
    pub fn as_i64(&self) -> Option<i64> {
        match self.data.get(0)?.cast(ElemType::Long) {
            Ok(Value::Long(v)) => Some(v),
            _ => None,
        }
    }

    /// Keep only the cells at `indices`, in that order.
    pub fn retain_indices(&mut self, indices: &[usize]) -> Result<()> {
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len) {
            return Err(self.out_of_range(bad));
        }
        let picked = self.data.gather(indices);
        if picked.len() > self.data.len() {
            self.data.resize(picked.len());
        }
        self.data.copy_from(&picked)?;
        self.len = indices.len();
        Ok(())
    }

    fn out_of_range(&self, index: usize) -> StreamError {
        StreamError::IndexOutOfRange { name: self.spec.field_name.clone(), index, len: self.len }
    }

    fn typed<T: Element>(&self) -> Result<&Vec<T>> {
        T::cells(&self.data).ok_or_else(|| self.mismatch::<T>())
    }

    fn typed_mut<T: Element>(&mut self) -> Result<&mut Vec<T>> {
        if self.data.elem() != T::ELEM {
            return Err(self.mismatch::<T>());
        }
        let name = &self.spec.field_name;
        T::cells_mut(&mut self.data).ok_or_else(|| StreamError::TypeMismatch(name.clone()))
    }

    fn mismatch<T: Element>(&self) -> StreamError {
        StreamError::TypeMismatch(format!(
            "{} holds {}, not {}",
            self.spec.field_name,
            self.data.elem(),
            T::ELEM
        ))
    }
}

/// All buffers of one stream, addressable by field name or [`FieldId`].
#[derive(Debug, Clone, Default)]
pub struct BufferSet {
    buffers: Vec<FieldBuffer>,
    by_name: HashMap<String, FieldId>,
    by_branch: HashMap<String, FieldId>,
}

impl BufferSet {
    /// Allocate one buffer per schema field, at default values.
    pub fn declare(schema: &Schema) -> Self {
        let mut set = BufferSet::default();
        for spec in schema.fields() {
            let id = FieldId(set.buffers.len());
            set.by_name.insert(spec.field_name.clone(), id);
            set.by_branch.entry(spec.branch_name.clone()).or_insert(id);
            set.buffers.push(FieldBuffer::new(spec.clone()));
        }
        for i in 0..set.buffers.len() {
            if set.buffers[i].kind() != FieldKind::CounterArray {
                continue;
            }
            let counter = set.buffers[i].spec.counter_name.clone();
            if let Some(counter) = counter {
                set.buffers[i].counter = set.lookup(&counter);
            }
        }
        set
    }

    /// Reset every buffer to its zero value and default length.
    pub fn init_defaults(&mut self) {
        for buffer in &mut self.buffers {
            buffer.reset();
        }
    }

    /// Number of buffers.
    pub fn field_count(&self) -> usize {
        self.buffers.len()
    }

    /// Whether no field was declared.
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<FieldId> {
        self.by_name.get(name).or_else(|| self.by_branch.get(name)).copied()
    }

    /// Resolve a field name (or, failing that, a branch name).
    pub fn id(&self, name: &str) -> Result<FieldId> {
        self.lookup(name).ok_or_else(|| StreamError::UnknownField(name.to_string()))
    }

    /// Resolve a persisted column name.
    pub fn id_by_branch(&self, branch: &str) -> Option<FieldId> {
        self.by_branch.get(branch).copied()
    }

    /// Buffer by id.
    pub fn buffer(&self, id: FieldId) -> &FieldBuffer {
        &self.buffers[id.0]
    }

    /// Mutable buffer by id.
    pub fn buffer_mut(&mut self, id: FieldId) -> &mut FieldBuffer {
        &mut self.buffers[id.0]
    }

    /// Buffer by field name.
    pub fn get(&self, name: &str) -> Result<&FieldBuffer> {
        Ok(self.buffer(self.id(name)?))
    }

    fn get_mut(&mut self, name: &str) -> Result<&mut FieldBuffer> {
        let id = self.id(name)?;
        Ok(self.buffer_mut(id))
    }

    /// Buffers in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (FieldId, &FieldBuffer)> {
        self.buffers.iter().enumerate().map(|(i, b)| (FieldId(i), b))
    }

    /// Value of a scalar field.
    pub fn scalar<T: Element>(&self, name: &str) -> Result<T> {
        let buffer = self.get(name)?;
        if buffer.is_array() {
            return Err(StreamError::TypeMismatch(format!("{name} is an array")));
        }
        Ok(buffer.typed::<T>()?[0].clone())
    }

    /// Overwrite a scalar field.
    pub fn set_scalar<T: Element>(&mut self, name: &str, value: T) -> Result<()> {
        let buffer = self.get_mut(name)?;
        if buffer.is_array() {
            return Err(StreamError::TypeMismatch(format!("{name} is an array")));
        }
        buffer.typed_mut::<T>()?[0] = value;
        Ok(())
    }

    /// Logical contents of an array field.
    pub fn array<T: Element>(&self, name: &str) -> Result<&[T]> {
        let buffer = self.get(name)?;
        Ok(&buffer.typed::<T>()?[..buffer.len])
    }

    /// Replace the contents of an array field.
    pub fn set_array<T: Element>(&mut self, name: &str, values: &[T]) -> Result<()> {
        let buffer = self.get_mut(name)?;
        buffer.typed::<T>()?;
        buffer.set_len(values.len())?;
        buffer.typed_mut::<T>()?[..values.len()].clone_from_slice(values);
        Ok(())
    }

    /// Append to an array field.
    pub fn push<T: Element>(&mut self, name: &str, value: T) -> Result<()> {
        let buffer = self.get_mut(name)?;
        buffer.typed::<T>()?;
        let n = buffer.len;
        buffer.set_len(n + 1)?;
        buffer.typed_mut::<T>()?[n] = value;
        Ok(())
    }

    /// Set an array's logical length to 0.
    pub fn clear_array(&mut self, name: &str) -> Result<()> {
        self.get_mut(name)?.set_len(0)
    }

    /// Logical length of a field.
    pub fn len(&self, name: &str) -> Result<usize> {
        Ok(self.get(name)?.len)
    }

    /// Untyped cell access.
    pub fn value(&self, name: &str, index: usize) -> Result<Value> {
        self.get(name)?.value(index)
    }

    /// Untyped cell write with numeric casting.
    pub fn set_value(&mut self, name: &str, index: usize, value: Value) -> Result<()> {
        self.get_mut(name)?.set_value(index, value)
    }

    /// Set every counter to the logical length of the arrays it bounds.
    /// Arrays sharing a counter must agree.
    pub fn sync_counters(&mut self) -> Result<()> {
        let mut lengths: Vec<(FieldId, usize)> = Vec::new();
        for buffer in &self.buffers {
            let Some(counter) = buffer.counter else { continue };
            match lengths.iter().find(|(c, _)| *c == counter) {
                Some(&(_, expected)) if expected != buffer.len => {
                    return Err(StreamError::CounterMismatch {
                        counter: self.buffer(counter).spec.field_name.clone(),
                        expected,
                        found: buffer.len,
                    });
                }
                Some(_) => {}
                None => lengths.push((counter, buffer.len)),
            }
        }
        for (counter, len) in lengths {
            let n = i32::try_from(len).map_err(|_| {
                StreamError::TypeMismatch(format!("array length {len} does not fit a counter"))
            })?;
            self.buffer_mut(counter).data.set(0, Value::Int(n))?;
        }
        Ok(())
    }

    /// Set a counter-linked array's length from its counter's current value.
    /// Cells past the loaded length read as zero.
    pub fn apply_counter(&mut self, id: FieldId) -> Result<()> {
        let Some(counter) = self.buffer(id).counter else { return Ok(()) };
        let n = self.buffer(counter).as_i64().unwrap_or(0).max(0) as usize;
        let buffer = self.buffer_mut(id);
        let loaded = buffer.len;
        buffer.set_len(n)?;
        if n > loaded {
            buffer.data.zero_cells(loaded..n);
        }
        Ok(())
    }
}
