use std::sync::Arc;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use smallvec::SmallVec;
use crate::renderer::contexts::pipeline_ctx::contract::{validate_shared_layouts, ContractId, SceneContract};
use crate::renderer::contexts::pipeline_ctx::descriptor_set::SceneDescriptorSet;
use crate::renderer::contexts::pipeline_ctx::material::SceneMaterial;
use crate::renderer::error::SceneError;
use crate::renderer::resources::buffer::BufferRegion;
use crate::renderer::resources::mesh::{GfxMesh, Mesh};
use crate::renderer::resources::render_pass::RenderPass;

pub const MAX_VERTEX_BUFFERS: usize = 4;

pub type VertexBindings = SmallVec<[(vk::Buffer, u64); MAX_VERTEX_BUFFERS]>;

/// Buffers, set and ranges of a single indexed draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub set: vk::DescriptorSet,
    pub vertex_buffers: VertexBindings,
    pub index_buffer: vk::Buffer,
    pub index_offset: u64,
    pub first_index: u32,
    pub index_count: u32,
    pub instance_count: u32,
}

pub struct DrawItem {
    pub material: Arc<SceneMaterial>,
    pub call: DrawCall,
}

/// A set may only be drawn if it has a material built against the list's contract
pub fn check_contract(expected: ContractId, material_contract: Option<ContractId>) -> Result<()> {
    match material_contract {
        None => Err(SceneError::MissingMaterial.into()),
        Some(id) if id != expected => Err(SceneError::ForeignContract.into()),
        Some(_) => Ok(()),
    }
}

pub fn draw_call(
    set: vk::DescriptorSet,
    vertex_buffers: &[BufferRegion],
    index_buffer: BufferRegion,
    index_count: u32,
    instance_count: u32,
) -> Result<DrawCall> {
    if vertex_buffers.len() > MAX_VERTEX_BUFFERS {
        return Err(SceneError::TooManyVertexBuffers {
            count: vertex_buffers.len(),
            max: MAX_VERTEX_BUFFERS,
        }.into());
    }

    Ok(DrawCall {
        set,
        vertex_buffers: vertex_buffers.iter().map(|r| (r.buffer, r.offset)).collect(),
        index_buffer: index_buffer.buffer,
        index_offset: index_buffer.offset,
        first_index: 0,
        index_count,
        instance_count,
    })
}

/// One draw per requested material of `mesh`, optionally instanced from a per-instance
/// vertex stream bound after the mesh vertices.
/// Every material index is checked before any call is built.
pub fn mesh_draw_calls(
    set: vk::DescriptorSet,
    vertices: BufferRegion,
    indices: BufferRegion,
    mesh: &Mesh,
    materials: &[usize],
    instances: Option<(BufferRegion, u64)>,
) -> Result<SmallVec<[DrawCall; 4]>> {
    let ranges = materials
        .iter()
        .map(|&m| mesh.material_index_range(m))
        .collect::<Result<SmallVec<[(u32, u32); 4]>>>()?;

    let mut vertex_buffers: VertexBindings = SmallVec::new();
    vertex_buffers.push((vertices.buffer, vertices.offset));
    let instance_count = match instances {
        Some((region, stride)) => {
            if stride == 0 {
                return Err(eyre!("Instance stride must be non-zero"));
            }
            vertex_buffers.push((region.buffer, region.offset));
            u32::try_from(region.range / stride)?
        }
        None => 1,
    };

    Ok(ranges
        .into_iter()
        .map(|(first_index, index_count)| DrawCall {
            set,
            vertex_buffers: vertex_buffers.clone(),
            index_buffer: indices.buffer,
            index_offset: indices.offset,
            first_index,
            index_count,
            instance_count,
        })
        .collect())
}

/// Ordered draws for one contract, replayed into any of the contract's render passes
pub struct DrawList {
    contract: Arc<SceneContract>,
    items: Vec<DrawItem>,
}

impl DrawList {
    pub fn new(contract: Arc<SceneContract>) -> Self {
        Self {
            contract,
            items: Vec::new(),
        }
    }

    fn material_for<'s>(&self, set: &'s SceneDescriptorSet) -> Result<&'s Arc<SceneMaterial>> {
        check_contract(self.contract.id(), set.material().map(|m| m.contract_id()))?;
        set.material().ok_or_else(|| SceneError::MissingMaterial.into())
    }

    pub fn draw(
        &mut self,
        set: &SceneDescriptorSet,
        vertex_buffers: &[BufferRegion],
        index_buffer: BufferRegion,
        index_count: u32,
        instance_count: u32,
    ) -> Result<()> {
        let material = self.material_for(set)?.clone();
        let call = draw_call(set.handle(), vertex_buffers, index_buffer, index_count, instance_count)?;
        self.items.push(DrawItem { material, call });
        Ok(())
    }

    pub fn draw_mesh_subset(
        &mut self,
        set: &SceneDescriptorSet,
        mesh: &GfxMesh,
        materials: &[usize],
        instances: Option<(BufferRegion, u64)>,
    ) -> Result<()> {
        let material = self.material_for(set)?.clone();
        let calls = mesh_draw_calls(
            set.handle(),
            mesh.vertex_buffer.region(),
            mesh.index_buffer.region(),
            &mesh.mesh,
            materials,
            instances,
        )?;
        self.items.extend(calls.into_iter().map(|call| DrawItem {
            material: material.clone(),
            call,
        }));
        Ok(())
    }

    pub fn draw_mesh_instanced(
        &mut self,
        set: &SceneDescriptorSet,
        mesh: &GfxMesh,
        instances: BufferRegion,
        stride: u64,
    ) -> Result<()> {
        let materials: SmallVec<[usize; 8]> = (0..mesh.mesh.materials.len()).collect();
        self.draw_mesh_subset(set, mesh, &materials, Some((instances, stride)))
    }

    pub fn draw_mesh(&mut self, set: &SceneDescriptorSet, mesh: &GfxMesh) -> Result<()> {
        let materials: SmallVec<[usize; 8]> = (0..mesh.mesh.materials.len()).collect();
        self.draw_mesh_subset(set, mesh, &materials, None)
    }

    /// Record every item into `cmd`, which must be inside `render_pass`.
    /// The shared sets are bound once at set 0 and each item's set right after them.
    /// Nothing is recorded if the shared sets or the pass don't match the contract.
    pub fn write_commands(
        &self,
        cmd: vk::CommandBuffer,
        render_pass: &RenderPass,
        shared_sets: &[&SceneDescriptorSet],
    ) -> Result<()> {
        let shared_layouts: SmallVec<[vk::DescriptorSetLayout; 4]> =
            shared_sets.iter().map(|s| s.layout()).collect();
        validate_shared_layouts(self.contract.shared_layouts(), &shared_layouts)?;
        let pass_index = self.contract.render_pass_index(render_pass)?;
        let pipelines = self.items
            .iter()
            .map(|item| item.material.pipeline(pass_index))
            .collect::<Result<Vec<_>>>()?;

        let device = self.contract.context().device();
        let first_set = shared_sets.len() as u32;
        unsafe {
            if !shared_sets.is_empty() {
                let handles: SmallVec<[vk::DescriptorSet; 4]> =
                    shared_sets.iter().map(|s| s.handle()).collect();
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    self.contract.example_layout(),
                    0,
                    &handles,
                    &[],
                );
            }

            for (item, pipeline) in self.items.iter().zip(pipelines) {
                let call = &item.call;
                device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline);
                device.cmd_bind_descriptor_sets(
                    cmd,
                    vk::PipelineBindPoint::GRAPHICS,
                    item.material.pipeline_layout(),
                    first_set,
                    &[call.set],
                    &[],
                );
                if !call.vertex_buffers.is_empty() {
                    let (buffers, offsets): (SmallVec<[vk::Buffer; 4]>, SmallVec<[u64; 4]>) =
                        call.vertex_buffers.iter().copied().unzip();
                    device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &offsets);
                }
                device.cmd_bind_index_buffer(cmd, call.index_buffer, call.index_offset, vk::IndexType::UINT32);
                device.cmd_draw_indexed(cmd, call.index_count, call.instance_count, call.first_index, 0, 0);
            }
        }

        log::trace!("Recorded {} draw items into pass {}", self.items.len(), pass_index);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[DrawItem] {
        &self.items
    }

    pub fn contract(&self) -> &Arc<SceneContract> {
        &self.contract
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use crate::renderer::resources::mesh::MeshMaterial;

    fn region(raw: u64, offset: u64, range: u64) -> BufferRegion {
        BufferRegion {
            buffer: vk::Buffer::from_raw(raw),
            offset,
            range,
        }
    }

    fn three_part_mesh() -> Mesh {
        let material = |first_triangle, num_triangles| MeshMaterial {
            name: String::new(),
            first_triangle,
            num_triangles,
        };
        Mesh {
            triangles: vec![[0, 1, 2]; 60],
            materials: vec![material(0, 10), material(10, 30), material(40, 20)],
            ..Default::default()
        }
    }

    #[test]
    fn material_contract_must_match() {
        let ours = ContractId::from_raw(1);
        assert!(check_contract(ours, Some(ours)).is_ok());

        let err = check_contract(ours, Some(ContractId::from_raw(2))).unwrap_err();
        assert_eq!(err.downcast_ref::<SceneError>(), Some(&SceneError::ForeignContract));

        let err = check_contract(ours, None).unwrap_err();
        assert_eq!(err.downcast_ref::<SceneError>(), Some(&SceneError::MissingMaterial));
    }

    #[test]
    fn explicit_draw_keeps_buffer_offsets() {
        let set = vk::DescriptorSet::from_raw(7);
        let call = draw_call(
            set,
            &[region(1, 64, 128), region(2, 0, 32)],
            region(3, 256, 24),
            6,
            2,
        ).unwrap();
        assert_eq!(call.vertex_buffers.as_slice(), &[(vk::Buffer::from_raw(1), 64), (vk::Buffer::from_raw(2), 0)]);
        assert_eq!((call.index_buffer, call.index_offset), (vk::Buffer::from_raw(3), 256));
        assert_eq!((call.first_index, call.index_count, call.instance_count), (0, 6, 2));
    }

    #[test]
    fn too_many_vertex_streams() {
        let streams = [region(1, 0, 4); 5];
        let err = draw_call(vk::DescriptorSet::null(), &streams, region(2, 0, 4), 3, 1).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::TooManyVertexBuffers { count: 5, max: 4 }),
        );
    }

    #[test]
    fn mesh_subset_uses_triangle_ranges() {
        crate::init_test_logging();
        let mesh = three_part_mesh();
        let calls = mesh_draw_calls(
            vk::DescriptorSet::null(),
            region(1, 0, 0),
            region(2, 0, 0),
            &mesh,
            &[1, 2],
            None,
        ).unwrap();

        assert_eq!(calls.len(), 2);
        assert_eq!((calls[0].first_index, calls[0].index_count), (30, 90));
        assert_eq!((calls[1].first_index, calls[1].index_count), (120, 60));
        assert!(calls.iter().all(|c| c.instance_count == 1 && c.vertex_buffers.len() == 1));
    }

    #[test]
    fn instanced_mesh_binds_a_second_stream() {
        let mesh = three_part_mesh();
        let calls = mesh_draw_calls(
            vk::DescriptorSet::null(),
            region(1, 0, 0),
            region(2, 0, 0),
            &mesh,
            &[0],
            Some((region(9, 512, 640), 64)),
        ).unwrap();

        assert_eq!(calls[0].instance_count, 10);
        assert_eq!(calls[0].vertex_buffers[1], (vk::Buffer::from_raw(9), 512));
    }

    #[test]
    fn instance_count_past_u32_is_rejected() {
        let mesh = three_part_mesh();
        let result = mesh_draw_calls(
            vk::DescriptorSet::null(),
            region(1, 0, 0),
            region(2, 0, 0),
            &mesh,
            &[0],
            Some((region(9, 0, u64::from(u32::MAX) + 1), 1)),
        );
        assert!(result.is_err());
    }

    #[test]
    fn bad_subset_builds_nothing() {
        let mesh = three_part_mesh();
        let err = mesh_draw_calls(
            vk::DescriptorSet::null(),
            region(1, 0, 0),
            region(2, 0, 0),
            &mesh,
            &[0, 3],
            None,
        ).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::MeshMaterialOutOfRange { index: 3, count: 3 }),
        );

        assert!(mesh_draw_calls(
            vk::DescriptorSet::null(),
            region(1, 0, 0),
            region(2, 0, 0),
            &mesh,
            &[0],
            Some((region(9, 0, 64), 0)),
        ).is_err());
    }
}
