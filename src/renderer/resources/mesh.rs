use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use glam::{Mat4, Quat, Vec3};
use crate::renderer::contexts::device_ctx::DeviceContext;
use crate::renderer::error::SceneError;
use crate::renderer::resources::buffer::StaticBuffer;
use crate::renderer::resources::vertex::Vertex;
use crate::renderer::util;

static MESH_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoneKeyframe {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scaling: Vec3,
}

impl Default for BoneKeyframe {
    fn default() -> Self {
        Self {
            translation: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scaling: Vec3::ONE,
        }
    }
}

impl BoneKeyframe {
    /// Translation, then rotation, then scaling: `T * R * S`
    pub fn local_transform(&self) -> Mat4 {
        Mat4::from_translation(self.translation)
            * Mat4::from_quat(self.rotation)
            * Mat4::from_scale(self.scaling)
    }

    pub fn transformed(&self, m: &Mat4) -> Self {
        Self {
            translation: util::transform_vector(m, self.translation),
            rotation: util::transform_quat(m, self.rotation),
            scaling: util::transform_scaling(m, self.scaling),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bone {
    pub name: String,
    pub parent_index: Option<usize>,
    pub initial_pose: BoneKeyframe,
    pub model_to_bone_matrix: Mat4,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Keyframe {
    pub key: i64,
    pub local_transforms: Vec<BoneKeyframe>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    pub name: String,
    pub keyframes: Vec<Keyframe>,
}

/// A contiguous run of triangles drawn with one material
fn triangle_indices(triangles: usize) -> Result<u32> {
    let indices = triangles
        .checked_mul(3)
        .ok_or_else(|| eyre!("{} triangles overflow the index range", triangles))?;
    Ok(u32::try_from(indices)?)
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeshMaterial {
    pub name: String,
    pub first_triangle: usize,
    pub num_triangles: usize,
}

impl MeshMaterial {
    /// `(first_index, index_count)` of this material's triangles in the index buffer
    pub fn index_range(&self) -> Result<(u32, u32)> {
        Ok((triangle_indices(self.first_triangle)?, triangle_indices(self.num_triangles)?))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mesh {
    pub vertices: Vec<Vertex>,
    pub triangles: Vec<[u32; 3]>,
    pub bones: Vec<Bone>,
    pub animations: Vec<Animation>,
    pub materials: Vec<MeshMaterial>,
}

impl Mesh {
    /// Model-space pose of bone `index` in its initial pose
    pub fn get_bone_pose(&self, index: usize) -> Result<Mat4> {
        self.compose_pose(index, |bone, _| Some(bone.initial_pose))
    }

    /// Model-space pose of bone `index` given one local transform per bone
    pub fn get_bone_pose_from(&self, keyframes: &[BoneKeyframe], index: usize) -> Result<Mat4> {
        self.compose_pose(index, |_, i| keyframes.get(i).copied())
    }

    // Walks up the parent chain, multiplying each parent in front of the pose so far
    fn compose_pose(
        &self,
        index: usize,
        local: impl Fn(&Bone, usize) -> Option<BoneKeyframe>,
    ) -> Result<Mat4> {
        let mut pose = Mat4::IDENTITY;
        let mut current = Some(index);
        let mut depth = 0;

        while let Some(i) = current {
            let bone = self.bones
                .get(i)
                .ok_or_else(|| eyre!("Bone {} out of range ({} bones)", i, self.bones.len()))?;
            let keyframe = local(bone, i)
                .ok_or_else(|| eyre!("No keyframe for bone {}", i))?;
            pose = keyframe.local_transform() * pose;

            depth += 1;
            if depth > self.bones.len() {
                return Err(eyre!("Bone {} has a cyclic parent chain", index));
            }
            current = bone.parent_index;
        }

        Ok(pose)
    }

    pub fn material_index_range(&self, material: usize) -> Result<(u32, u32)> {
        self.materials
            .get(material)
            .ok_or(SceneError::MeshMaterialOutOfRange {
                index: material,
                count: self.materials.len(),
            })?
            .index_range()
    }

    /// Re-express the mesh in another coordinate system (see `util::make_transform_4x4`)
    pub fn transformed(&self, m: &Mat4) -> Self {
        let mut mesh = self.clone();
        for vertex in &mut mesh.vertices {
            vertex.position = util::transform_point(m, vertex.position);
            vertex.normal = util::transform_normal(m, vertex.normal);
            vertex.tangent = util::transform_tangent(m, vertex.tangent);
            vertex.bitangent = util::transform_tangent(m, vertex.bitangent);
        }
        for bone in &mut mesh.bones {
            bone.initial_pose = bone.initial_pose.transformed(m);
            bone.model_to_bone_matrix = util::transform_matrix(m, &bone.model_to_bone_matrix);
        }
        for keyframe in mesh.animations.iter_mut().flat_map(|a| a.keyframes.iter_mut()) {
            for local in &mut keyframe.local_transforms {
                *local = local.transformed(m);
            }
        }
        mesh
    }

    pub fn index_count(&self) -> Result<u32> {
        triangle_indices(self.triangles.len())
    }
}

/// A mesh with its vertices and triangles uploaded to device-local buffers
pub struct GfxMesh {
    pub mesh: Mesh,
    pub vertex_buffer: StaticBuffer,
    pub index_buffer: StaticBuffer,
    id: u32,
}

impl GfxMesh {
    pub fn new(ctx: Arc<DeviceContext>, mesh: Mesh) -> Result<Self> {
        let vertex_buffer = StaticBuffer::new(
            ctx.clone(),
            vk::BufferUsageFlags::VERTEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            bytemuck::cast_slice(&mesh.vertices),
        )?;
        let index_buffer = StaticBuffer::new(
            ctx,
            vk::BufferUsageFlags::INDEX_BUFFER,
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            bytemuck::cast_slice(&mesh.triangles),
        )?;
        let id = MESH_ID_COUNTER.fetch_add(1, Ordering::Relaxed);

        log::debug!(
            "Uploaded mesh {}: {} vertices, {} triangles, {} materials",
            id,
            mesh.vertices.len(),
            mesh.triangles.len(),
            mesh.materials.len(),
        );

        Ok(Self { mesh, vertex_buffer, index_buffer, id })
    }

    pub fn id(&self) -> u32 {
        self.id
    }
}

impl PartialEq for GfxMesh {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn bone(parent_index: Option<usize>, initial_pose: BoneKeyframe) -> Bone {
        Bone {
            name: String::new(),
            parent_index,
            initial_pose,
            model_to_bone_matrix: Mat4::IDENTITY,
        }
    }

    fn two_bone_mesh() -> Mesh {
        let parent = BoneKeyframe {
            translation: Vec3::X,
            rotation: Quat::from_rotation_z(FRAC_PI_2),
            ..Default::default()
        };
        let child = BoneKeyframe { translation: Vec3::X, ..Default::default() };
        Mesh {
            bones: vec![bone(None, parent), bone(Some(0), child)],
            ..Default::default()
        }
    }

    #[test]
    fn local_transform_scales_before_rotating_and_translating() {
        let keyframe = BoneKeyframe {
            translation: Vec3::new(0.0, 0.0, 5.0),
            rotation: Quat::from_rotation_z(FRAC_PI_2),
            scaling: Vec3::splat(2.0),
        };
        let p = keyframe.local_transform().transform_point3(Vec3::X);
        assert!(p.abs_diff_eq(Vec3::new(0.0, 2.0, 5.0), 1e-5));
    }

    #[test]
    fn bone_pose_multiplies_parent_before_child() {
        let mesh = two_bone_mesh();
        let origin = mesh.get_bone_pose(1).unwrap().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-5), "{origin}");

        let root = mesh.get_bone_pose(0).unwrap().transform_point3(Vec3::ZERO);
        assert!(root.abs_diff_eq(Vec3::X, 1e-5));
    }

    #[test]
    fn bone_pose_from_keyframes() {
        let mesh = two_bone_mesh();
        let keyframes = [
            BoneKeyframe { translation: Vec3::Y, ..Default::default() },
            BoneKeyframe { translation: Vec3::Y, ..Default::default() },
        ];
        let origin = mesh.get_bone_pose_from(&keyframes, 1).unwrap().transform_point3(Vec3::ZERO);
        assert!(origin.abs_diff_eq(Vec3::new(0.0, 2.0, 0.0), 1e-5));

        assert!(mesh.get_bone_pose_from(&keyframes[..1], 1).is_err());
    }

    #[test]
    fn bad_bone_indices_are_errors() {
        let mut mesh = two_bone_mesh();
        assert!(mesh.get_bone_pose(2).is_err());

        mesh.bones[0].parent_index = Some(1);
        assert!(mesh.get_bone_pose(1).is_err());
    }

    #[test]
    fn material_ranges_are_in_indices() {
        let mesh = Mesh {
            triangles: vec![[0, 1, 2]; 40],
            materials: vec![
                MeshMaterial { name: "a".into(), first_triangle: 0, num_triangles: 10 },
                MeshMaterial { name: "b".into(), first_triangle: 10, num_triangles: 30 },
            ],
            ..Default::default()
        };
        assert_eq!(mesh.material_index_range(1).unwrap(), (30, 90));
        assert_eq!(mesh.index_count().unwrap(), 120);

        let err = mesh.material_index_range(2).unwrap_err();
        assert_eq!(
            err.downcast_ref::<SceneError>(),
            Some(&SceneError::MeshMaterialOutOfRange { index: 2, count: 2 }),
        );
    }

    #[test]
    fn index_ranges_past_u32_are_rejected() {
        let material = MeshMaterial {
            name: "huge".into(),
            first_triangle: u32::MAX as usize,
            num_triangles: 1,
        };
        assert!(material.index_range().is_err());

        let material = MeshMaterial { first_triangle: usize::MAX, ..material };
        assert!(material.index_range().is_err());

        let material = MeshMaterial { first_triangle: 0x5555_5555, num_triangles: 0, ..material };
        assert_eq!(material.index_range().unwrap(), (0xffff_ffff, 0));
    }

    #[test]
    fn transformed_mesh_moves_vertices_and_bones() {
        use crate::renderer::util::{make_transform_4x4, CoordAxis, CoordSystem};

        let y_up = CoordSystem::new(CoordAxis::Right, CoordAxis::Up, CoordAxis::Back);
        let z_up = CoordSystem::new(CoordAxis::Right, CoordAxis::Forward, CoordAxis::Up);
        let m = make_transform_4x4(&y_up, &z_up);

        let mut mesh = two_bone_mesh();
        mesh.bones[1].initial_pose.translation = Vec3::Y;
        mesh.vertices.push(Vertex {
            position: Vec3::Y,
            normal: Vec3::Y,
            tangent: Vec3::X,
            bitangent: Vec3::Z,
            ..Default::default()
        });

        let moved = mesh.transformed(&m);
        let vertex = &moved.vertices[0];
        assert!(vertex.position.abs_diff_eq(Vec3::Z, 1e-5));
        assert!(vertex.normal.abs_diff_eq(Vec3::Z, 1e-5));
        assert!(vertex.bitangent.abs_diff_eq(Vec3::NEG_Y, 1e-5));
        assert!(moved.bones[1].initial_pose.translation.abs_diff_eq(Vec3::Z, 1e-5));
    }
}
