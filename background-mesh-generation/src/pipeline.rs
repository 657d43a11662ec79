//! Stage orchestration over a single working directory.
//!
//! Each stage reads the artefacts of the previous one from disk and writes
//! its own; nothing is passed in memory between stages, so any stage can be
//! re-run on its own.

use crate::aligner::GroundAligner;
use crate::camera::CameraIntrinsics;
use crate::config::PipelineConfig;
use crate::depth::{DepthEstimator, DepthMap, FocalLengthRecord};
use crate::error::{PipelineError, PipelineResult};
use crate::fitter::SceneFitter;
use crate::heightmap::HeightmapMesher;
use crate::manifest::{BackgroundManifest, DepthInfo, MeshInfo, PointsInfo, RefineInfo};
use crate::mesh_io::{read_obj, write_obj};
use crate::point_cloud_io::{write_ply, write_point_cloud};
use crate::projector::{PointMap, project};
use crate::scene::SceneDescription;
use crate::storage::require_input;
use constants::files;
use image::RgbImage;
use log::info;
use std::fs;
use std::path::{Path, PathBuf};

pub struct BackgroundPipeline {
    workdir: PathBuf,
    image_path: PathBuf,
    scene_path: PathBuf,
    config: PipelineConfig,
}

impl BackgroundPipeline {
    /// Pipeline over `workdir`, creating it if needed.
    pub fn new(workdir: impl Into<PathBuf>, config: PipelineConfig) -> PipelineResult<Self> {
        let workdir = workdir.into();
        fs::create_dir_all(&workdir)?;
        Ok(Self {
            image_path: workdir.join(files::BACKGROUND_IMAGE),
            scene_path: workdir.join(files::SCENE),
            workdir,
            config,
        })
    }

    /// Use a colour image outside the working directory.
    pub fn with_image(mut self, image_path: impl Into<PathBuf>) -> Self {
        self.image_path = image_path.into();
        self
    }

    /// Use an object placement file outside the working directory.
    pub fn with_scene(mut self, scene_path: impl Into<PathBuf>) -> Self {
        self.scene_path = scene_path.into();
        self
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn path(&self, name: &str) -> PathBuf {
        self.workdir.join(name)
    }

    fn point_cloud_path(&self) -> PathBuf {
        let format = self.config.output.point_cloud_format;
        self.path(&format!("{}.{}", files::POINT_CLOUD_STEM, format.extension()))
    }

    fn update_manifest<F>(&self, edit: F) -> PipelineResult<()>
    where
        F: FnOnce(&mut BackgroundManifest),
    {
        BackgroundManifest::update(&self.path(files::MANIFEST), edit)?;
        Ok(())
    }

    fn load_image(&self, stage: &'static str) -> PipelineResult<RgbImage> {
        require_input(&self.image_path, stage)?;
        Ok(image::open(&self.image_path)?.to_rgb8())
    }

    /// Runs the depth estimator and stores its raster, preview and focal length.
    pub fn depth(&self, estimator: &dyn DepthEstimator) -> PipelineResult<DepthInfo> {
        info!("Stage 1: depth estimation");
        let image = self.load_image("image generation")?;
        let estimate = estimator.estimate(&image)?;
        let depth = estimate.depth;

        let (min, max) = depth.range();
        info!(
            "Depth {}x{} in [{:.3}, {:.3}] m, focal length {:.2}px",
            depth.width(),
            depth.height(),
            min,
            max,
            estimate.focal_length_px
        );

        depth.save_exr(&self.path(files::DEPTH_MAP))?;
        depth.save_preview(&self.path(files::DEPTH_PREVIEW))?;
        FocalLengthRecord {
            focal_length_px: estimate.focal_length_px,
        }
        .save(&self.path(files::FOCAL_LENGTH))?;

        let info = DepthInfo {
            depth_map: files::DEPTH_MAP.to_string(),
            preview: files::DEPTH_PREVIEW.to_string(),
            focal_length_px: estimate.focal_length_px,
            width: depth.width(),
            height: depth.height(),
            depth_range: [min, max],
        };
        self.update_manifest(|m| m.depth = Some(info.clone()))?;
        Ok(info)
    }

    /// Back-projects the stored depth into the point map and point cloud.
    pub fn points(&self) -> PipelineResult<PointsInfo> {
        info!("Stage 2: point cloud projection");
        let depth_path = self.path(files::DEPTH_MAP);
        require_input(&depth_path, "depth")?;
        let depth = DepthMap::load_exr(&depth_path)?;
        let focal = FocalLengthRecord::load(&self.path(files::FOCAL_LENGTH))?;
        let image = self.load_image("image generation")?;

        let (point_map, camera) = project(&depth, &image, focal.focal_length_px)?;

        point_map.save(
            &self.path(files::POINT_MAP_POSITION),
            &self.path(files::POINT_MAP_COLOUR),
        )?;
        camera.save(&self.path(files::CAMERA))?;

        let point_cloud_path = self.point_cloud_path();
        write_point_cloud(
            &point_cloud_path,
            &point_map.positions(),
            &point_map.colours(),
            self.config.output.point_cloud_format,
        )?;

        let info = PointsInfo {
            position_texture: files::POINT_MAP_POSITION.to_string(),
            colour_texture: files::POINT_MAP_COLOUR.to_string(),
            point_cloud: file_name(&point_cloud_path),
            point_cloud_format: self.config.output.point_cloud_format,
            camera: files::CAMERA.to_string(),
            point_count: point_map.len(),
        };
        self.update_manifest(|m| m.points = Some(info.clone()))?;
        Ok(info)
    }

    fn load_point_map(&self) -> PipelineResult<PointMap> {
        let position = self.path(files::POINT_MAP_POSITION);
        let colour = self.path(files::POINT_MAP_COLOUR);
        require_input(&position, "points")?;
        require_input(&colour, "points")?;
        PointMap::load(&position, &colour)
    }

    /// Triangulates the point map into the textured checkpoint mesh.
    pub fn mesh(&self) -> PipelineResult<MeshInfo> {
        info!("Stage 3: heightmap meshing");
        let point_map = self.load_point_map()?;
        let camera = CameraIntrinsics::load(&self.path(files::CAMERA))?;
        let texture = self.load_image("image generation")?;

        let mesh = HeightmapMesher::new(self.config.mesh.clone()).build(&point_map, &camera, &texture)?;
        write_obj(&self.path(files::MESH), &mesh)?;

        let info = MeshInfo {
            mesh: files::MESH.to_string(),
            vertex_source: self.config.mesh.vertex_source,
            vertex_count: mesh.vertex_count(),
            triangle_count: mesh.triangle_count(),
        };
        self.update_manifest(|m| m.mesh = Some(info.clone()))?;
        Ok(info)
    }

    /// Gravity alignment and object fit of the checkpoint mesh.
    pub fn refine(&self) -> PipelineResult<RefineInfo> {
        info!("Stage 4: gravity alignment and scene fit");
        let camera_path = self.path(files::CAMERA);
        let mut camera = CameraIntrinsics::load(&camera_path)?;
        let points = self.load_point_map()?.positions();

        let mesh_path = self.path(files::MESH);
        require_input(&mesh_path, "mesh")?;
        let mut mesh = read_obj(&mesh_path)?;

        let scene = SceneDescription::load(&self.scene_path)?;
        let object_bounds = scene.bounds().ok_or(PipelineError::NoObjects)?;
        let (object_x, object_y, _) = object_bounds.dimensions();
        info!(
            "Fitting under {} objects spanning {:.2} x {:.2}",
            scene.objects.len(),
            object_x,
            object_y
        );

        let aligner = GroundAligner::new(self.config.ransac.clone(), self.config.alignment.clone());
        let alignment = aligner.align(&points)?;
        let fit = SceneFitter::new(self.config.fit.clone()).apply(
            &mut mesh,
            &alignment.transform(),
            &scene.objects,
        )?;

        let (diagnostic_points, diagnostic_colours) =
            aligner.diagnostic_cloud(&points, &alignment.normal);
        write_ply(
            &self.path(files::GROUND_NORMAL),
            &diagnostic_points,
            &diagnostic_colours,
        )?;
        write_obj(&self.path(files::MESH_ALIGNED), &mesh)?;
        camera.cam_orientation = Some(alignment.cam_orientation);
        camera.save(&camera_path)?;

        let [w, x, y, z] = alignment.cam_orientation;
        info!("Camera orientation [{:.4}, {:.4}, {:.4}, {:.4}]", w, x, y, z);

        let info = RefineInfo {
            mesh: files::MESH_ALIGNED.to_string(),
            ground_normal: files::GROUND_NORMAL.to_string(),
            plane: alignment.plane.coefficients(),
            inlier_count: alignment.inlier_count,
            ground_normal_vector: [alignment.normal.x, alignment.normal.y, alignment.normal.z],
            cam_orientation: alignment.cam_orientation,
            fit,
        };
        self.update_manifest(|m| m.refine = Some(info.clone()))?;
        Ok(info)
    }

    /// Every stage in order.
    pub fn run(&self, estimator: &dyn DepthEstimator) -> PipelineResult<BackgroundManifest> {
        self.depth(estimator)?;
        self.points()?;
        self.mesh()?;
        self.refine()?;
        info!("Background mesh ready in {}", self.workdir.display());
        BackgroundManifest::load_or_default(&self.path(files::MANIFEST))
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}
