//! Offline static-mesh import: glTF in, CPU-side vertex/index/section data
//! out. No GPU objects are touched here; the render layer uploads the
//! result on its own terms.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Quat, Vec2, Vec3};
use gltf::scene::Transform;
use std::{
    fmt,
    path::{Path, PathBuf},
};

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct StaticMeshVertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub uv0: Vec2,
    pub tangent: Vec3,
}

// The 44-byte stride is the input-layout contract with the render side.
const _: () = assert!(std::mem::size_of::<StaticMeshVertex>() == 44);

#[derive(Clone, Debug, Default)]
pub struct StaticMeshSection {
    pub name: String,
    pub material_index: u32,
    pub index_start: u32,
    pub index_count: u32,
    pub vertex_base: i32,
}

#[derive(Clone, Debug, Default)]
pub struct StaticMesh {
    pub vertices: Vec<StaticMeshVertex>,
    pub indices: Vec<u32>,
    pub sections: Vec<StaticMeshSection>,
    pub material_names: Vec<String>,
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
}

impl StaticMesh {
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.sections.clear();
        self.material_names.clear();
        self.bounds_min = Vec3::ZERO;
        self.bounds_max = Vec3::ZERO;
    }

    pub fn is_valid(&self) -> bool {
        !self.vertices.is_empty() && !self.indices.is_empty()
    }

    pub fn recompute_bounds(&mut self) {
        let Some(first) = self.vertices.first() else {
            self.bounds_min = Vec3::ZERO;
            self.bounds_max = Vec3::ZERO;
            return;
        };

        let mut min = first.position;
        let mut max = first.position;
        for vertex in &self.vertices {
            min = min.min(vertex.position);
            max = max.max(vertex.position);
        }
        self.bounds_min = min;
        self.bounds_max = max;
    }

    pub const fn vertex_stride() -> u32 {
        std::mem::size_of::<StaticMeshVertex>() as u32
    }
}

#[derive(Clone, Copy, Debug)]
pub struct MeshImportOptions {
    /// Compute smooth normals for primitives that ship without them.
    pub generate_normals: bool,
    /// Compute UV-space tangents for primitives that ship without them.
    pub generate_tangents: bool,
    /// Interpret v as starting at the top of the image.
    pub flip_uvs: bool,
    /// Import every mesh in the scene graph; otherwise stop after the
    /// first node that contributes geometry.
    pub merge_meshes: bool,
    /// Bake each node's accumulated scene-graph transform into its
    /// vertices.
    pub apply_node_transforms: bool,
}

impl Default for MeshImportOptions {
    fn default() -> Self {
        Self {
            generate_normals: true,
            generate_tangents: true,
            flip_uvs: false,
            merge_meshes: true,
            apply_node_transforms: true,
        }
    }
}

#[derive(Debug)]
pub enum MeshImportError {
    FileNotFound(PathBuf),
    Importer(gltf::Error),
    NoMeshes,
    NoTriangles,
}

impl fmt::Display for MeshImportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshImportError::FileNotFound(path) => {
                write!(f, "mesh file not found: {}", path.display())
            }
            MeshImportError::Importer(error) => write!(f, "glTF import failed: {error}"),
            MeshImportError::NoMeshes => write!(f, "file contains no meshes"),
            MeshImportError::NoTriangles => {
                write!(f, "no valid triangle meshes were imported")
            }
        }
    }
}

impl std::error::Error for MeshImportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MeshImportError::Importer(error) => Some(error),
            _ => None,
        }
    }
}

impl From<gltf::Error> for MeshImportError {
    fn from(error: gltf::Error) -> Self {
        MeshImportError::Importer(error)
    }
}

/// Loads a glTF/GLB file into a single [`StaticMesh`], walking the scene
/// graph and appending one section per triangle primitive.
pub fn load_gltf(path: &Path, options: &MeshImportOptions) -> Result<StaticMesh, MeshImportError> {
    if !path.exists() {
        return Err(MeshImportError::FileNotFound(path.to_path_buf()));
    }

    let (document, buffers, _images) = gltf::import(path)?;
    if document.meshes().len() == 0 {
        return Err(MeshImportError::NoMeshes);
    }

    let mut mesh = StaticMesh {
        material_names: document
            .materials()
            .map(|material| material.name().unwrap_or_default().to_string())
            .collect(),
        ..Default::default()
    };

    'scenes: for scene in document.scenes() {
        for node in scene.nodes() {
            if !append_node(&node, Mat4::IDENTITY, &buffers, options, &mut mesh) {
                break 'scenes;
            }
        }
    }

    if !mesh.is_valid() {
        return Err(MeshImportError::NoTriangles);
    }
    mesh.recompute_bounds();
    tracing::debug!(
        vertices = mesh.vertices.len(),
        indices = mesh.indices.len(),
        sections = mesh.sections.len(),
        "mesh imported"
    );

    Ok(mesh)
}

fn local_transform(node: &gltf::Node) -> Mat4 {
    match node.transform() {
        Transform::Matrix { matrix } => Mat4::from_cols_array_2d(&matrix),
        Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => Mat4::from_scale_rotation_translation(
            Vec3::from_array(scale),
            Quat::from_array(rotation),
            Vec3::from_array(translation),
        ),
    }
}

/// Returns false once importing should stop (single-mesh mode found its
/// geometry).
fn append_node(
    node: &gltf::Node,
    parent_transform: Mat4,
    buffers: &[gltf::buffer::Data],
    options: &MeshImportOptions,
    out: &mut StaticMesh,
) -> bool {
    let global = parent_transform * local_transform(node);

    if let Some(gltf_mesh) = node.mesh() {
        let name = gltf_mesh.name().unwrap_or_default();
        let mut appended = false;
        for primitive in gltf_mesh.primitives() {
            appended |= append_primitive(&primitive, name, buffers, global, options, out);
        }
        if appended && !options.merge_meshes {
            return false;
        }
    }

    for child in node.children() {
        if !append_node(&child, global, buffers, options, out) {
            return false;
        }
    }

    true
}

fn append_primitive(
    primitive: &gltf::Primitive,
    name: &str,
    buffers: &[gltf::buffer::Data],
    global: Mat4,
    options: &MeshImportOptions,
    out: &mut StaticMesh,
) -> bool {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        tracing::debug!(?name, mode = ?primitive.mode(), "skipping non-triangle primitive");
        return false;
    }

    let reader = primitive.reader(|buffer| Some(&buffers[buffer.index()]));
    let Some(positions) = reader.read_positions() else {
        return false;
    };
    let positions: Vec<Vec3> = positions.map(Vec3::from_array).collect();
    if positions.is_empty() {
        return false;
    }

    let normals = reader
        .read_normals()
        .map(|iter| iter.map(Vec3::from_array).collect::<Vec<_>>());
    let uvs = reader
        .read_tex_coords(0)
        .map(|iter| iter.into_f32().map(Vec2::from_array).collect::<Vec<_>>());
    let tangents = reader
        .read_tangents()
        .map(|iter| iter.map(|t| Vec3::new(t[0], t[1], t[2])).collect::<Vec<_>>());

    let base_vertex = out.vertices.len() as u32;
    let index_start = out.indices.len() as u32;
    let normal_matrix = Mat3::from_mat4(global);

    for (i, &position) in positions.iter().enumerate() {
        let mut position = position;
        let mut normal = normals.as_ref().map(|n| n[i]).unwrap_or(Vec3::Y);
        let mut tangent = tangents.as_ref().map(|t| t[i]).unwrap_or(Vec3::X);
        let mut uv = uvs.as_ref().map(|u| u[i]).unwrap_or(Vec2::ZERO);

        if options.apply_node_transforms {
            position = global.transform_point3(position);
            normal = (normal_matrix * normal).normalize_or_zero();
            tangent = (normal_matrix * tangent).normalize_or_zero();
        }
        if options.flip_uvs {
            uv.y = 1.0 - uv.y;
        }

        out.vertices.push(StaticMeshVertex {
            position,
            normal,
            uv0: uv,
            tangent,
        });
    }

    match reader.read_indices() {
        Some(indices) => out
            .indices
            .extend(indices.into_u32().map(|index| base_vertex + index)),
        None => out
            .indices
            .extend(base_vertex..base_vertex + positions.len() as u32),
    }

    let vertices = &mut out.vertices[base_vertex as usize..];
    let indices = &out.indices[index_start as usize..];
    if normals.is_none() && options.generate_normals {
        generate_smooth_normals(vertices, indices, base_vertex);
    }
    if tangents.is_none() && options.generate_tangents {
        generate_tangents(vertices, indices, base_vertex);
    }

    let material_index = primitive.material().index().unwrap_or(0) as u32;
    if out.material_names.len() <= material_index as usize {
        out.material_names
            .resize(material_index as usize + 1, String::new());
    }
    out.sections.push(StaticMeshSection {
        name: name.to_string(),
        material_index,
        index_start,
        index_count: out.indices.len() as u32 - index_start,
        vertex_base: 0,
    });

    true
}

/// Area-weighted face-normal accumulation over one primitive's vertex
/// range; `indices` are still offset by `base_vertex`.
fn generate_smooth_normals(vertices: &mut [StaticMeshVertex], indices: &[u32], base_vertex: u32) {
    let mut accumulated = vec![Vec3::ZERO; vertices.len()];
    for triangle in indices.chunks_exact(3) {
        let i0 = (triangle[0] - base_vertex) as usize;
        let i1 = (triangle[1] - base_vertex) as usize;
        let i2 = (triangle[2] - base_vertex) as usize;
        let edge1 = vertices[i1].position - vertices[i0].position;
        let edge2 = vertices[i2].position - vertices[i0].position;
        let face_normal = edge1.cross(edge2);
        accumulated[i0] += face_normal;
        accumulated[i1] += face_normal;
        accumulated[i2] += face_normal;
    }

    for (vertex, normal) in vertices.iter_mut().zip(accumulated) {
        vertex.normal = normal.try_normalize().unwrap_or(Vec3::Y);
    }
}

fn generate_tangents(vertices: &mut [StaticMeshVertex], indices: &[u32], base_vertex: u32) {
    let mut accumulated = vec![Vec3::ZERO; vertices.len()];
    for triangle in indices.chunks_exact(3) {
        let i0 = (triangle[0] - base_vertex) as usize;
        let i1 = (triangle[1] - base_vertex) as usize;
        let i2 = (triangle[2] - base_vertex) as usize;
        let edge1 = vertices[i1].position - vertices[i0].position;
        let edge2 = vertices[i2].position - vertices[i0].position;
        let duv1 = vertices[i1].uv0 - vertices[i0].uv0;
        let duv2 = vertices[i2].uv0 - vertices[i0].uv0;

        let det = duv1.x * duv2.y - duv2.x * duv1.y;
        if det.abs() <= f32::EPSILON {
            continue;
        }
        let tangent = (edge1 * duv2.y - edge2 * duv1.y) / det;
        accumulated[i0] += tangent;
        accumulated[i1] += tangent;
        accumulated[i2] += tangent;
    }

    for (vertex, tangent) in vertices.iter_mut().zip(accumulated) {
        vertex.tangent = tangent.try_normalize().unwrap_or(Vec3::X);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_path() -> PathBuf {
        PathBuf::from(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/tests/data/triangle.gltf"
        ))
    }

    fn vertex(position: Vec3) -> StaticMeshVertex {
        StaticMeshVertex {
            position,
            normal: Vec3::Y,
            uv0: Vec2::ZERO,
            tangent: Vec3::X,
        }
    }

    #[test]
    fn vertex_stride_matches_input_layout() {
        assert_eq!(StaticMesh::vertex_stride(), 44);
    }

    #[test]
    fn bounds_cover_all_vertices() {
        let mut mesh = StaticMesh::default();
        mesh.vertices.push(vertex(Vec3::new(-1.0, 2.0, 0.5)));
        mesh.vertices.push(vertex(Vec3::new(3.0, -4.0, 0.0)));
        mesh.recompute_bounds();
        assert_eq!(mesh.bounds_min, Vec3::new(-1.0, -4.0, 0.0));
        assert_eq!(mesh.bounds_max, Vec3::new(3.0, 2.0, 0.5));
    }

    #[test]
    fn empty_mesh_is_invalid() {
        let mut mesh = StaticMesh::default();
        assert!(!mesh.is_valid());
        mesh.vertices.push(vertex(Vec3::ZERO));
        assert!(!mesh.is_valid());
        mesh.indices.push(0);
        assert!(mesh.is_valid());
        mesh.clear();
        assert!(!mesh.is_valid());
    }

    #[test]
    fn smooth_normals_face_out_of_the_triangle_plane() {
        let mut vertices = vec![
            vertex(Vec3::ZERO),
            vertex(Vec3::X),
            vertex(Vec3::Y),
        ];
        generate_smooth_normals(&mut vertices, &[0, 1, 2], 0);
        for v in &vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-5);
        }
    }

    #[test]
    fn missing_file_is_reported() {
        let error = load_gltf(Path::new("no/such/file.gltf"), &MeshImportOptions::default());
        assert!(matches!(error, Err(MeshImportError::FileNotFound(_))));
    }

    #[test]
    fn triangle_asset_imports() {
        let mesh = load_gltf(&triangle_path(), &MeshImportOptions::default()).unwrap();
        assert_eq!(mesh.vertices.len(), 3);
        assert_eq!(mesh.indices, vec![0, 1, 2]);
        assert_eq!(mesh.sections.len(), 1);
        assert_eq!(mesh.sections[0].name, "tri");
        assert_eq!(mesh.sections[0].index_start, 0);
        assert_eq!(mesh.sections[0].index_count, 3);
        assert_eq!(mesh.bounds_min, Vec3::ZERO);
        assert_eq!(mesh.bounds_max, Vec3::new(1.0, 1.0, 0.0));
        // No normals in the asset; the importer generates them.
        for v in &mesh.vertices {
            assert!((v.normal - Vec3::Z).length() < 1e-5);
        }
        // Degenerate UVs fall back to the +X tangent.
        for v in &mesh.vertices {
            assert_eq!(v.tangent, Vec3::X);
        }
    }

    #[test]
    fn normals_default_when_generation_is_off() {
        let options = MeshImportOptions {
            generate_normals: false,
            ..Default::default()
        };
        let mesh = load_gltf(&triangle_path(), &options).unwrap();
        for v in &mesh.vertices {
            assert_eq!(v.normal, Vec3::Y);
        }
    }

    #[test]
    fn flip_uvs_mirrors_v() {
        let options = MeshImportOptions {
            flip_uvs: true,
            ..Default::default()
        };
        let mesh = load_gltf(&triangle_path(), &options).unwrap();
        // The asset has no UVs; the (0,0) default mirrors to (0,1).
        for v in &mesh.vertices {
            assert_eq!(v.uv0, Vec2::new(0.0, 1.0));
        }
    }
}
