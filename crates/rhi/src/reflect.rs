//! SPIR-V reflection.
//!
//! Derives everything a pipeline layout and vertex input state need from a
//! compiled module: vertex attributes (vertex stage only), uniform-buffer and
//! combined-image-sampler bindings, and push-constant ranges.
//!
//! The reflected types are plain `PartialEq` values so two reflections of the
//! same blob compare equal; convert with the `to_vk` helpers at the Vulkan
//! boundary.

use std::collections::{BTreeMap, HashMap, HashSet};

use ash::vk;
use rspirv::dr::{Instruction, Module, Operand};
use rspirv::spirv::{Decoration, Op, StorageClass, Word};

use crate::error::ShaderReflectError;

type ReflectResult<T> = std::result::Result<T, ShaderReflectError>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexAttribute {
    pub location: u32,
    pub binding: u32,
    pub format: vk::Format,
    pub offset: u32,
}

impl VertexAttribute {
    pub fn to_vk(&self) -> vk::VertexInputAttributeDescription {
        vk::VertexInputAttributeDescription {
            location: self.location,
            binding: self.binding,
            format: self.format,
            offset: self.offset,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VertexBinding {
    pub binding: u32,
    pub stride: u32,
}

impl VertexBinding {
    pub fn to_vk(&self) -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: self.binding,
            stride: self.stride,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }
}

/// A descriptor binding tagged with the set it belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DescriptorBinding {
    pub set: u32,
    pub binding: u32,
    pub descriptor_type: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    fn same_slot(&self, other: &DescriptorBinding) -> bool {
        self.set == other.set
            && self.binding == other.binding
            && self.descriptor_type == other.descriptor_type
    }

    pub fn to_vk(&self) -> vk::DescriptorSetLayoutBinding<'static> {
        vk::DescriptorSetLayoutBinding::default()
            .binding(self.binding)
            .descriptor_type(self.descriptor_type)
            .descriptor_count(self.count)
            .stage_flags(self.stages)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PushConstantRange {
    pub stages: vk::ShaderStageFlags,
    pub offset: u32,
    pub size: u32,
}

impl PushConstantRange {
    pub fn to_vk(&self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: self.stages,
            offset: self.offset,
            size: self.size,
        }
    }
}

/// Interface of one shader stage, or of several stages after [`combine`].
///
/// [`combine`]: ShaderResources::combine
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShaderResources {
    pub attributes: Vec<VertexAttribute>,
    pub bindings: Vec<VertexBinding>,
    pub descriptor_bindings: Vec<DescriptorBinding>,
    pub push_constant_ranges: Vec<PushConstantRange>,
}

impl ShaderResources {
    /// Merges per-stage resources into a pipeline-wide view.
    ///
    /// Vertex attributes, vertex bindings and push-constant ranges are
    /// concatenated. Descriptor bindings sharing `(set, binding, type)` are
    /// merged by OR-ing their stage flags.
    pub fn combine<'a>(stages: impl IntoIterator<Item = &'a ShaderResources>) -> Self {
        let mut combined = ShaderResources::default();
        for resources in stages {
            combined.attributes.extend_from_slice(&resources.attributes);
            combined.bindings.extend_from_slice(&resources.bindings);
            for binding in &resources.descriptor_bindings {
                add_descriptor_binding(&mut combined.descriptor_bindings, *binding);
            }
            combined
                .push_constant_ranges
                .extend_from_slice(&resources.push_constant_ranges);
        }
        combined
    }

    /// Bindings grouped by set index, ascending, each group in binding order.
    pub fn bindings_by_set(&self) -> BTreeMap<u32, Vec<DescriptorBinding>> {
        let mut sets: BTreeMap<u32, Vec<DescriptorBinding>> = BTreeMap::new();
        for binding in &self.descriptor_bindings {
            sets.entry(binding.set).or_default().push(*binding);
        }
        for bindings in sets.values_mut() {
            bindings.sort_by_key(|b| b.binding);
        }
        sets
    }

    pub fn has_vertex_input(&self) -> bool {
        !self.attributes.is_empty()
    }
}

fn add_descriptor_binding(bindings: &mut Vec<DescriptorBinding>, new: DescriptorBinding) {
    match bindings.iter_mut().find(|b| b.same_slot(&new)) {
        Some(existing) => existing.stages |= new.stages,
        None => bindings.push(new),
    }
}

/// Sorts ranges by offset and folds overlapping or touching neighbours.
pub fn merge_push_constant_ranges(mut ranges: Vec<PushConstantRange>) -> Vec<PushConstantRange> {
    ranges.sort_by_key(|r| r.offset);
    let mut merged: Vec<PushConstantRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(prev) if prev.offset + prev.size >= range.offset => {
                prev.size = prev.size.max(range.offset + range.size - prev.offset);
                prev.stages |= range.stages;
            }
            _ => merged.push(range),
        }
    }
    merged
}

/// Reflects a SPIR-V module compiled for `stage`.
pub fn reflect(words: &[u32], stage: vk::ShaderStageFlags) -> ReflectResult<ShaderResources> {
    let module = rspirv::dr::load_words(words)
        .map_err(|e| ShaderReflectError::Parse(format!("{:?}", e)))?;
    Reflector::new(&module)?.reflect(stage)
}

/// Converts a little-endian SPIR-V byte stream into words.
pub fn words_from_bytes(bytes: &[u8]) -> ReflectResult<Vec<u32>> {
    if bytes.len() % 4 != 0 {
        return Err(ShaderReflectError::Parse(format!(
            "byte length {} is not a multiple of 4",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

#[derive(Clone, Debug)]
enum SpirvType {
    Float { width: u32 },
    Int { width: u32 },
    Bool,
    Vector { component: Word, count: u32 },
    Matrix { column: Word, count: u32 },
    Array { element: Word, length: u32 },
    RuntimeArray,
    Struct { members: Vec<Word> },
    Image,
    Sampler,
    SampledImage,
    Pointer { storage: StorageClass, pointee: Word },
    Other,
}

struct Variable {
    id: Word,
    storage: StorageClass,
    pointee: Word,
}

struct Reflector {
    types: HashMap<Word, SpirvType>,
    constants: HashMap<Word, u32>,
    decorations: HashMap<(Word, Decoration), u32>,
    flags: HashSet<(Word, Decoration)>,
    member_decorations: HashMap<(Word, u32, Decoration), u32>,
    variables: Vec<Variable>,
}

fn literal(operand: Option<&Operand>) -> Option<u32> {
    match operand? {
        Operand::LiteralBit32(v) => Some(*v),
        _ => None,
    }
}

fn id_ref(operand: Option<&Operand>) -> Option<Word> {
    match operand? {
        Operand::IdRef(id) => Some(*id),
        _ => None,
    }
}

fn result_id(inst: &Instruction) -> ReflectResult<Word> {
    inst.result_id
        .ok_or_else(|| ShaderReflectError::Parse(format!("{:?} without result id", inst.class.opcode)))
}

impl Reflector {
    fn new(module: &Module) -> ReflectResult<Self> {
        let mut reflector = Self {
            types: HashMap::new(),
            constants: HashMap::new(),
            decorations: HashMap::new(),
            flags: HashSet::new(),
            member_decorations: HashMap::new(),
            variables: Vec::new(),
        };

        for inst in &module.annotations {
            match inst.class.opcode {
                Op::Decorate => {
                    let (Some(target), Some(Operand::Decoration(decoration))) =
                        (id_ref(inst.operands.first()), inst.operands.get(1))
                    else {
                        continue;
                    };
                    match literal(inst.operands.get(2)) {
                        Some(value) => {
                            reflector.decorations.insert((target, *decoration), value);
                        }
                        None => {
                            reflector.flags.insert((target, *decoration));
                        }
                    }
                }
                Op::MemberDecorate => {
                    let (Some(target), Some(member), Some(Operand::Decoration(decoration))) = (
                        id_ref(inst.operands.first()),
                        literal(inst.operands.get(1)),
                        inst.operands.get(2),
                    ) else {
                        continue;
                    };
                    if let Some(value) = literal(inst.operands.get(3)) {
                        reflector
                            .member_decorations
                            .insert((target, member, *decoration), value);
                    } else if *decoration == Decoration::BuiltIn {
                        reflector.flags.insert((target, Decoration::BuiltIn));
                    }
                }
                _ => {}
            }
        }

        for inst in &module.types_global_values {
            reflector.visit_global(inst)?;
        }

        Ok(reflector)
    }

    fn visit_global(&mut self, inst: &Instruction) -> ReflectResult<()> {
        let ops = &inst.operands;
        let ty = match inst.class.opcode {
            Op::TypeFloat => SpirvType::Float {
                width: literal(ops.first()).unwrap_or(32),
            },
            Op::TypeInt => SpirvType::Int {
                width: literal(ops.first()).unwrap_or(32),
            },
            Op::TypeBool => SpirvType::Bool,
            Op::TypeVector => SpirvType::Vector {
                component: id_ref(ops.first()).unwrap_or(0),
                count: literal(ops.get(1)).unwrap_or(0),
            },
            Op::TypeMatrix => SpirvType::Matrix {
                column: id_ref(ops.first()).unwrap_or(0),
                count: literal(ops.get(1)).unwrap_or(0),
            },
            Op::TypeArray => {
                let length_id = id_ref(ops.get(1)).unwrap_or(0);
                SpirvType::Array {
                    element: id_ref(ops.first()).unwrap_or(0),
                    length: self.constants.get(&length_id).copied().unwrap_or(1),
                }
            }
            Op::TypeRuntimeArray => SpirvType::RuntimeArray,
            Op::TypeStruct => SpirvType::Struct {
                members: ops.iter().filter_map(|op| id_ref(Some(op))).collect(),
            },
            Op::TypeImage => SpirvType::Image,
            Op::TypeSampler => SpirvType::Sampler,
            Op::TypeSampledImage => SpirvType::SampledImage,
            Op::TypePointer => match (ops.first(), id_ref(ops.get(1))) {
                (Some(Operand::StorageClass(storage)), Some(pointee)) => SpirvType::Pointer {
                    storage: *storage,
                    pointee,
                },
                _ => SpirvType::Other,
            },
            Op::TypeVoid | Op::TypeFunction => SpirvType::Other,
            Op::Constant => {
                if let Some(value) = literal(ops.first()) {
                    self.constants.insert(result_id(inst)?, value);
                }
                return Ok(());
            }
            Op::Variable => {
                let id = result_id(inst)?;
                let pointer = inst.result_type.ok_or_else(|| {
                    ShaderReflectError::Parse(format!("variable %{} without type", id))
                })?;
                if let Some(SpirvType::Pointer { storage, pointee }) = self.types.get(&pointer) {
                    self.variables.push(Variable {
                        id,
                        storage: *storage,
                        pointee: *pointee,
                    });
                }
                return Ok(());
            }
            _ => return Ok(()),
        };
        self.types.insert(result_id(inst)?, ty);
        Ok(())
    }

    fn reflect(&self, stage: vk::ShaderStageFlags) -> ReflectResult<ShaderResources> {
        let mut resources = ShaderResources::default();

        if stage.contains(vk::ShaderStageFlags::VERTEX) {
            self.reflect_vertex_inputs(&mut resources)?;
        }

        // Uniform buffers first, then samplers, each in declaration order.
        for var in &self.variables {
            if var.storage == StorageClass::Uniform {
                if self.flags.contains(&(var.pointee, Decoration::BufferBlock)) {
                    return Err(ShaderReflectError::UnsupportedFormat(format!(
                        "storage buffer %{}",
                        var.id
                    )));
                }
                let binding = self.descriptor_binding(var, vk::DescriptorType::UNIFORM_BUFFER, 1, stage)?;
                add_descriptor_binding(&mut resources.descriptor_bindings, binding);
            } else if var.storage == StorageClass::StorageBuffer {
                return Err(ShaderReflectError::UnsupportedFormat(format!(
                    "storage buffer %{}",
                    var.id
                )));
            }
        }
        for var in &self.variables {
            if var.storage != StorageClass::UniformConstant {
                continue;
            }
            let (element, count) = match self.types.get(&var.pointee) {
                Some(SpirvType::Array { element, length }) => (*element, *length),
                _ => (var.pointee, 1),
            };
            match self.types.get(&element) {
                Some(SpirvType::SampledImage) => {
                    let binding = self.descriptor_binding(
                        var,
                        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                        count,
                        stage,
                    )?;
                    add_descriptor_binding(&mut resources.descriptor_bindings, binding);
                }
                other => {
                    return Err(ShaderReflectError::UnsupportedFormat(format!(
                        "uniform constant %{} of type {:?}",
                        var.id, other
                    )));
                }
            }
        }

        let mut offset = 0;
        let mut ranges = Vec::new();
        for var in self
            .variables
            .iter()
            .filter(|v| v.storage == StorageClass::PushConstant)
        {
            let size = self.declared_size(var.pointee)?;
            match ranges
                .iter_mut()
                .find(|r: &&mut PushConstantRange| r.offset == offset)
            {
                Some(existing) => {
                    existing.stages |= stage;
                    existing.size = existing.size.max(size);
                }
                None => ranges.push(PushConstantRange {
                    stages: stage,
                    offset,
                    size,
                }),
            }
            offset += size;
        }
        resources.push_constant_ranges = merge_push_constant_ranges(ranges);

        Ok(resources)
    }

    fn reflect_vertex_inputs(&self, resources: &mut ShaderResources) -> ReflectResult<()> {
        let mut attributes = Vec::new();
        for var in self
            .variables
            .iter()
            .filter(|v| v.storage == StorageClass::Input)
        {
            if self.is_builtin(var) {
                continue;
            }
            let location = self
                .decorations
                .get(&(var.id, Decoration::Location))
                .copied()
                .ok_or_else(|| {
                    ShaderReflectError::MissingDecoration(format!(
                        "vertex input %{} has no location",
                        var.id
                    ))
                })?;
            let binding = self
                .decorations
                .get(&(var.id, Decoration::Binding))
                .copied()
                .unwrap_or(0);
            attributes.push(VertexAttribute {
                location,
                binding,
                format: self.vertex_format(var.pointee)?,
                offset: 0,
            });
        }

        attributes.sort_by_key(|a| (a.binding, a.location));

        let mut strides: BTreeMap<u32, u32> = BTreeMap::new();
        for attr in &mut attributes {
            let stride = strides.entry(attr.binding).or_insert(0);
            attr.offset = *stride;
            *stride += format_size(attr.format);
        }

        resources.bindings = strides
            .into_iter()
            .map(|(binding, stride)| VertexBinding { binding, stride })
            .collect();
        resources.attributes = attributes;
        Ok(())
    }

    fn is_builtin(&self, var: &Variable) -> bool {
        self.decorations.contains_key(&(var.id, Decoration::BuiltIn))
            || self.flags.contains(&(var.id, Decoration::BuiltIn))
            || self.flags.contains(&(var.pointee, Decoration::BuiltIn))
    }

    fn descriptor_binding(
        &self,
        var: &Variable,
        descriptor_type: vk::DescriptorType,
        count: u32,
        stage: vk::ShaderStageFlags,
    ) -> ReflectResult<DescriptorBinding> {
        let lookup = |decoration: Decoration| {
            self.decorations
                .get(&(var.id, decoration))
                .copied()
                .ok_or_else(|| {
                    ShaderReflectError::MissingDecoration(format!(
                        "%{} has no {:?}",
                        var.id, decoration
                    ))
                })
        };
        Ok(DescriptorBinding {
            set: lookup(Decoration::DescriptorSet)?,
            binding: lookup(Decoration::Binding)?,
            descriptor_type,
            count,
            stages: stage,
        })
    }

    fn vertex_format(&self, type_id: Word) -> ReflectResult<vk::Format> {
        let unsupported = || {
            ShaderReflectError::UnsupportedFormat(format!(
                "vertex input type %{}: {:?}",
                type_id,
                self.types.get(&type_id)
            ))
        };
        let (component, count) = match self.types.get(&type_id) {
            Some(SpirvType::Vector { component, count }) => (*component, *count),
            Some(SpirvType::Float { .. }) => (type_id, 1),
            _ => return Err(unsupported()),
        };
        match (self.types.get(&component), count) {
            (Some(SpirvType::Float { width: 32 }), 1) => Ok(vk::Format::R32_SFLOAT),
            (Some(SpirvType::Float { width: 32 }), 2) => Ok(vk::Format::R32G32_SFLOAT),
            (Some(SpirvType::Float { width: 32 }), 3) => Ok(vk::Format::R32G32B32_SFLOAT),
            (Some(SpirvType::Float { width: 32 }), 4) => Ok(vk::Format::R32G32B32A32_SFLOAT),
            _ => Err(unsupported()),
        }
    }

    /// Declared size of a block member type, honouring `Offset`,
    /// `ArrayStride` and `MatrixStride` decorations.
    fn declared_size(&self, type_id: Word) -> ReflectResult<u32> {
        self.size_of(type_id, None)
    }

    fn size_of(&self, type_id: Word, matrix_stride: Option<u32>) -> ReflectResult<u32> {
        match self.types.get(&type_id) {
            Some(SpirvType::Float { width }) | Some(SpirvType::Int { width }) => Ok(width / 8),
            Some(SpirvType::Bool) => Ok(4),
            Some(SpirvType::Vector { component, count }) => {
                Ok(self.size_of(*component, None)? * count)
            }
            Some(SpirvType::Matrix { column, count }) => match matrix_stride {
                Some(stride) => Ok(stride * count),
                None => Ok(self.size_of(*column, None)? * count),
            },
            Some(SpirvType::Array { element, length }) => {
                let stride = match self.decorations.get(&(type_id, Decoration::ArrayStride)) {
                    Some(stride) => *stride,
                    None => self.size_of(*element, None)?,
                };
                Ok(stride * length)
            }
            Some(SpirvType::Struct { members }) => {
                let mut end = 0;
                let mut running = 0;
                for (index, member) in members.iter().enumerate() {
                    let index = index as u32;
                    let stride = self
                        .member_decorations
                        .get(&(type_id, index, Decoration::MatrixStride))
                        .copied();
                    let size = self.size_of(*member, stride)?;
                    let offset = self
                        .member_decorations
                        .get(&(type_id, index, Decoration::Offset))
                        .copied()
                        .unwrap_or(running);
                    running = offset + size;
                    end = end.max(running);
                }
                Ok(end)
            }
            other => Err(ShaderReflectError::UnsupportedFormat(format!(
                "cannot size type %{}: {:?}",
                type_id, other
            ))),
        }
    }
}

/// Byte size of the float formats reflection can produce.
pub fn format_size(format: vk::Format) -> u32 {
    match format {
        vk::Format::R32_SFLOAT => 4,
        vk::Format::R32G32_SFLOAT => 8,
        vk::Format::R32G32B32_SFLOAT => 12,
        vk::Format::R32G32B32A32_SFLOAT => 16,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal SPIR-V assembler for building reflection inputs by hand.
    struct Asm {
        words: Vec<u32>,
        next_id: u32,
    }

    const OP_CAPABILITY: u32 = 17;
    const OP_MEMORY_MODEL: u32 = 14;
    const OP_DECORATE: u32 = 71;
    const OP_MEMBER_DECORATE: u32 = 72;
    const OP_TYPE_VOID: u32 = 19;
    const OP_TYPE_INT: u32 = 21;
    const OP_TYPE_FLOAT: u32 = 22;
    const OP_TYPE_VECTOR: u32 = 23;
    const OP_TYPE_MATRIX: u32 = 24;
    const OP_TYPE_IMAGE: u32 = 25;
    const OP_TYPE_SAMPLED_IMAGE: u32 = 27;
    const OP_TYPE_STRUCT: u32 = 30;
    const OP_TYPE_POINTER: u32 = 32;
    const OP_VARIABLE: u32 = 59;

    const DEC_BLOCK: u32 = 2;
    const DEC_MATRIX_STRIDE: u32 = 7;
    const DEC_COL_MAJOR: u32 = 5;
    const DEC_BUILTIN: u32 = 11;
    const DEC_LOCATION: u32 = 30;
    const DEC_BINDING: u32 = 33;
    const DEC_SET: u32 = 34;
    const DEC_OFFSET: u32 = 35;

    const SC_UNIFORM_CONSTANT: u32 = 0;
    const SC_INPUT: u32 = 1;
    const SC_UNIFORM: u32 = 2;
    const SC_PUSH_CONSTANT: u32 = 9;

    impl Asm {
        fn new() -> Self {
            let mut asm = Self {
                words: Vec::new(),
                next_id: 1,
            };
            asm.inst(OP_CAPABILITY, &[1]);
            asm.inst(OP_MEMORY_MODEL, &[0, 1]);
            asm
        }

        fn id(&mut self) -> u32 {
            let id = self.next_id;
            self.next_id += 1;
            id
        }

        fn inst(&mut self, op: u32, operands: &[u32]) {
            self.words.push(((operands.len() as u32 + 1) << 16) | op);
            self.words.extend_from_slice(operands);
        }

        fn decorate(&mut self, target: u32, decoration: u32, value: Option<u32>) {
            match value {
                Some(v) => self.inst(OP_DECORATE, &[target, decoration, v]),
                None => self.inst(OP_DECORATE, &[target, decoration]),
            }
        }

        fn words(&self) -> Vec<u32> {
            let mut words = vec![0x0723_0203, 0x0001_0000, 0, self.next_id, 0];
            words.extend_from_slice(&self.words);
            words
        }
    }

    /// Vertex shader with inputs vec3@0, vec2@2, vec3@1, a gl_VertexIndex
    /// builtin, a camera UBO at (0,0) and a {mat4, mat4} push block.
    fn vertex_module() -> Vec<u32> {
        let mut asm = Asm::new();
        let (float, int, vec2, vec3, vec4, mat4) =
            (asm.id(), asm.id(), asm.id(), asm.id(), asm.id(), asm.id());
        let (p_in_vec3, p_in_vec2, p_in_int) = (asm.id(), asm.id(), asm.id());
        let (pos, uv, normal, vertex_index) = (asm.id(), asm.id(), asm.id(), asm.id());
        let (ubo_struct, p_ubo, ubo) = (asm.id(), asm.id(), asm.id());
        let (pc_struct, p_pc, pc) = (asm.id(), asm.id(), asm.id());

        asm.decorate(pos, DEC_LOCATION, Some(0));
        asm.decorate(uv, DEC_LOCATION, Some(2));
        asm.decorate(normal, DEC_LOCATION, Some(1));
        asm.decorate(vertex_index, DEC_BUILTIN, Some(42));
        asm.decorate(ubo_struct, DEC_BLOCK, None);
        asm.decorate(ubo, DEC_SET, Some(0));
        asm.decorate(ubo, DEC_BINDING, Some(0));
        asm.decorate(pc_struct, DEC_BLOCK, None);
        for member in 0..2 {
            asm.inst(OP_MEMBER_DECORATE, &[pc_struct, member, DEC_COL_MAJOR]);
            asm.inst(
                OP_MEMBER_DECORATE,
                &[pc_struct, member, DEC_OFFSET, member * 64],
            );
            asm.inst(
                OP_MEMBER_DECORATE,
                &[pc_struct, member, DEC_MATRIX_STRIDE, 16],
            );
        }
        asm.inst(OP_MEMBER_DECORATE, &[ubo_struct, 0, DEC_COL_MAJOR]);
        asm.inst(OP_MEMBER_DECORATE, &[ubo_struct, 0, DEC_OFFSET, 0]);
        asm.inst(OP_MEMBER_DECORATE, &[ubo_struct, 0, DEC_MATRIX_STRIDE, 16]);

        let void = asm.id();
        asm.inst(OP_TYPE_VOID, &[void]);
        asm.inst(OP_TYPE_FLOAT, &[float, 32]);
        asm.inst(OP_TYPE_INT, &[int, 32, 1]);
        asm.inst(OP_TYPE_VECTOR, &[vec2, float, 2]);
        asm.inst(OP_TYPE_VECTOR, &[vec3, float, 3]);
        asm.inst(OP_TYPE_VECTOR, &[vec4, float, 4]);
        asm.inst(OP_TYPE_MATRIX, &[mat4, vec4, 4]);
        asm.inst(OP_TYPE_POINTER, &[p_in_vec3, SC_INPUT, vec3]);
        asm.inst(OP_TYPE_POINTER, &[p_in_vec2, SC_INPUT, vec2]);
        asm.inst(OP_TYPE_POINTER, &[p_in_int, SC_INPUT, int]);
        asm.inst(OP_VARIABLE, &[p_in_vec3, pos, SC_INPUT]);
        asm.inst(OP_VARIABLE, &[p_in_vec2, uv, SC_INPUT]);
        asm.inst(OP_VARIABLE, &[p_in_vec3, normal, SC_INPUT]);
        asm.inst(OP_VARIABLE, &[p_in_int, vertex_index, SC_INPUT]);
        asm.inst(OP_TYPE_STRUCT, &[ubo_struct, mat4]);
        asm.inst(OP_TYPE_POINTER, &[p_ubo, SC_UNIFORM, ubo_struct]);
        asm.inst(OP_VARIABLE, &[p_ubo, ubo, SC_UNIFORM]);
        asm.inst(OP_TYPE_STRUCT, &[pc_struct, mat4, mat4]);
        asm.inst(OP_TYPE_POINTER, &[p_pc, SC_PUSH_CONSTANT, pc_struct]);
        asm.inst(OP_VARIABLE, &[p_pc, pc, SC_PUSH_CONSTANT]);
        asm.words()
    }

    /// Fragment shader sampling a texture at (1,2) and reading the same
    /// camera UBO at (0,0).
    fn fragment_module() -> Vec<u32> {
        let mut asm = Asm::new();
        let (float, vec4, mat4) = (asm.id(), asm.id(), asm.id());
        let (image, sampled, p_sampled, tex) = (asm.id(), asm.id(), asm.id(), asm.id());
        let (ubo_struct, p_ubo, ubo) = (asm.id(), asm.id(), asm.id());

        asm.decorate(tex, DEC_SET, Some(1));
        asm.decorate(tex, DEC_BINDING, Some(2));
        asm.decorate(ubo_struct, DEC_BLOCK, None);
        asm.decorate(ubo, DEC_SET, Some(0));
        asm.decorate(ubo, DEC_BINDING, Some(0));
        asm.inst(OP_MEMBER_DECORATE, &[ubo_struct, 0, DEC_OFFSET, 0]);

        asm.inst(OP_TYPE_FLOAT, &[float, 32]);
        asm.inst(OP_TYPE_VECTOR, &[vec4, float, 4]);
        asm.inst(OP_TYPE_MATRIX, &[mat4, vec4, 4]);
        asm.inst(OP_TYPE_IMAGE, &[image, float, 1, 0, 0, 0, 1, 0]);
        asm.inst(OP_TYPE_SAMPLED_IMAGE, &[sampled, image]);
        asm.inst(OP_TYPE_POINTER, &[p_sampled, SC_UNIFORM_CONSTANT, sampled]);
        asm.inst(OP_VARIABLE, &[p_sampled, tex, SC_UNIFORM_CONSTANT]);
        asm.inst(OP_TYPE_STRUCT, &[ubo_struct, mat4]);
        asm.inst(OP_TYPE_POINTER, &[p_ubo, SC_UNIFORM, ubo_struct]);
        asm.inst(OP_VARIABLE, &[p_ubo, ubo, SC_UNIFORM]);
        asm.words()
    }

    #[test]
    fn test_vertex_inputs_sorted_with_running_offsets() {
        let resources = reflect(&vertex_module(), vk::ShaderStageFlags::VERTEX).unwrap();

        let locations: Vec<u32> = resources.attributes.iter().map(|a| a.location).collect();
        assert_eq!(locations, vec![0, 1, 2]);

        let offsets: Vec<u32> = resources.attributes.iter().map(|a| a.offset).collect();
        assert_eq!(offsets, vec![0, 12, 24]);
        assert_eq!(resources.attributes[2].format, vk::Format::R32G32_SFLOAT);

        assert_eq!(
            resources.bindings,
            vec![VertexBinding {
                binding: 0,
                stride: 32
            }]
        );
    }

    #[test]
    fn test_push_constant_block_size() {
        let resources = reflect(&vertex_module(), vk::ShaderStageFlags::VERTEX).unwrap();
        assert_eq!(
            resources.push_constant_ranges,
            vec![PushConstantRange {
                stages: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: 128,
            }]
        );
    }

    #[test]
    fn test_fragment_stage_has_no_vertex_inputs() {
        let resources = reflect(&fragment_module(), vk::ShaderStageFlags::FRAGMENT).unwrap();
        assert!(resources.attributes.is_empty());
        assert_eq!(resources.descriptor_bindings.len(), 2);

        let sampler = resources
            .descriptor_bindings
            .iter()
            .find(|b| b.descriptor_type == vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
            .unwrap();
        assert_eq!((sampler.set, sampler.binding), (1, 2));
    }

    #[test]
    fn test_combine_ors_stage_flags() {
        let vert = reflect(&vertex_module(), vk::ShaderStageFlags::VERTEX).unwrap();
        let frag = reflect(&fragment_module(), vk::ShaderStageFlags::FRAGMENT).unwrap();

        let combined = ShaderResources::combine([&vert, &frag]);
        let camera = combined
            .descriptor_bindings
            .iter()
            .find(|b| b.set == 0 && b.binding == 0)
            .unwrap();
        assert_eq!(
            camera.stages,
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        assert_eq!(combined.descriptor_bindings.len(), 2);

        let reversed = ShaderResources::combine([&frag, &vert]);
        let mut a = combined.bindings_by_set();
        let mut b = reversed.bindings_by_set();
        for bindings in a.values_mut().chain(b.values_mut()) {
            bindings.sort_by_key(|x| (x.binding, x.descriptor_type.as_raw()));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_reflection_is_deterministic() {
        let words = vertex_module();
        let first = reflect(&words, vk::ShaderStageFlags::VERTEX).unwrap();
        let second = reflect(&words, vk::ShaderStageFlags::VERTEX).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_bindings_grouped_by_set() {
        let frag = reflect(&fragment_module(), vk::ShaderStageFlags::FRAGMENT).unwrap();
        let sets = frag.bindings_by_set();
        assert_eq!(sets.keys().copied().collect::<Vec<_>>(), vec![0, 1]);
    }

    #[test]
    fn test_missing_binding_decoration() {
        let mut asm = Asm::new();
        let (float, vec4, block, pointer, var) =
            (asm.id(), asm.id(), asm.id(), asm.id(), asm.id());
        asm.decorate(block, DEC_BLOCK, None);
        asm.decorate(var, DEC_SET, Some(0));
        asm.inst(OP_TYPE_FLOAT, &[float, 32]);
        asm.inst(OP_TYPE_VECTOR, &[vec4, float, 4]);
        asm.inst(OP_TYPE_STRUCT, &[block, vec4]);
        asm.inst(OP_TYPE_POINTER, &[pointer, SC_UNIFORM, block]);
        asm.inst(OP_VARIABLE, &[pointer, var, SC_UNIFORM]);

        let err = reflect(&asm.words(), vk::ShaderStageFlags::FRAGMENT).unwrap_err();
        assert!(matches!(err, ShaderReflectError::MissingDecoration(_)));
    }

    #[test]
    fn test_integer_vertex_input_is_unsupported() {
        let mut asm = Asm::new();
        let (int, pointer, var) = (asm.id(), asm.id(), asm.id());
        asm.decorate(var, DEC_LOCATION, Some(0));
        asm.inst(OP_TYPE_INT, &[int, 32, 1]);
        asm.inst(OP_TYPE_POINTER, &[pointer, SC_INPUT, int]);
        asm.inst(OP_VARIABLE, &[pointer, var, SC_INPUT]);

        let err = reflect(&asm.words(), vk::ShaderStageFlags::VERTEX).unwrap_err();
        assert!(matches!(err, ShaderReflectError::UnsupportedFormat(_)));
    }

    #[test]
    fn test_garbage_fails_to_parse() {
        let err = reflect(&[0xdead_beef, 1, 2], vk::ShaderStageFlags::VERTEX).unwrap_err();
        assert!(matches!(err, ShaderReflectError::Parse(_)));
    }

    #[test]
    fn test_merge_push_constant_ranges() {
        let vertex = vk::ShaderStageFlags::VERTEX;
        let fragment = vk::ShaderStageFlags::FRAGMENT;
        let merged = merge_push_constant_ranges(vec![
            PushConstantRange {
                stages: fragment,
                offset: 64,
                size: 16,
            },
            PushConstantRange {
                stages: vertex,
                offset: 0,
                size: 64,
            },
            PushConstantRange {
                stages: vertex,
                offset: 128,
                size: 4,
            },
        ]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].offset, 0);
        assert_eq!(merged[0].size, 80);
        assert_eq!(merged[0].stages, vertex | fragment);
        assert_eq!(merged[1].offset, 128);
    }

    #[test]
    fn test_words_from_bytes() {
        let words = words_from_bytes(&[0x03, 0x02, 0x23, 0x07]).unwrap();
        assert_eq!(words, vec![0x0723_0203]);
        assert!(words_from_bytes(&[1, 2, 3]).is_err());
    }
}
