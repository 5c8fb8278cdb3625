//! GPU compute backend.
//!
//! Owns two position and two velocity storage buffers on the device plus a
//! host shadow of both. Each step binds the current front pair as inputs
//! and the back pair as outputs, dispatches the kernel over the body range,
//! copies the freshly written buffers into staging, and blocks on the
//! readback so the host shadow always holds the new front state when
//! `advance` returns. The bind-group parity flip is the device-side role
//! swap.
//!
//! Adapter selection is by index: 0 is the primary GPU, 1 the secondary.
//! Asking for an index past the adapter list fails with a device error, so
//! a machine without a second GPU simply has no secondary worker.

use std::sync::mpsc;

use bytemuck::{Pod, Zeroable};
use log::info;
use wgpu::util::DeviceExt;

use crate::constants::bodies;
use crate::error::SimError;
use crate::params::SimParams;
use crate::worker::ComputeBackend;

/// Uniform block mirrored by `SimUniforms` in the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct SimUniforms {
    time_step: f32,
    softening_sq: f32,
    damping: f32,
    body_count: u32,
    range_min: u32,
    range_max: u32,
    _pad0: u32,
    _pad1: u32,
}

pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::ComputePipeline,
    /// One bind group per buffer parity; flipping is the role swap.
    bind_groups: [wgpu::BindGroup; 2],
    position_buffers: [wgpu::Buffer; 2],
    velocity_buffers: [wgpu::Buffer; 2],
    uniform_buffer: wgpu::Buffer,
    staging_positions: wgpu::Buffer,
    staging_velocities: wgpu::Buffer,
    /// Parity of the current front pair.
    frame: usize,
    last_uniforms: Option<SimUniforms>,
    host_positions: Vec<f32>,
    host_velocities: Vec<f32>,
    device_name: String,
    body_count: usize,
}

impl GpuBackend {
    /// Acquires the adapter at `adapter_index`, builds the kernel pipeline
    /// and allocates both buffer pairs.
    pub fn acquire(body_count: usize, adapter_index: usize) -> Result<Self, SimError> {
        if body_count == 0 || body_count % bodies::WORKGROUP_SIZE != 0 {
            return Err(SimError::Size(format!(
                "body count {body_count} is not a multiple of the workgroup size {}",
                bodies::WORKGROUP_SIZE
            )));
        }

        let instance = wgpu::Instance::default();
        let mut adapters = instance.enumerate_adapters(wgpu::Backends::all());
        if adapter_index >= adapters.len() {
            return Err(SimError::Device(format!(
                "no adapter at index {adapter_index} ({} present)",
                adapters.len()
            )));
        }
        let adapter = adapters.swap_remove(adapter_index);
        let info = adapter.get_info();

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("nbody device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_defaults(),
                memory_hints: wgpu::MemoryHints::Performance,
            },
            None,
        ))
        .map_err(|e| SimError::Device(e.to_string()))?;

        info!("acquired GPU adapter {} ({:?})", info.name, info.backend);

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("nbody kernel"),
            source: wgpu::ShaderSource::Wgsl(include_str!("nbody.wgsl").into()),
        });

        let buffer_size = (4 * body_count * std::mem::size_of::<f32>()) as u64;
        let zeroes = vec![0.0_f32; 4 * body_count];

        let storage = |label: &str| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(&zeroes),
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            })
        };
        let position_buffers = [storage("positions 0"), storage("positions 1")];
        let velocity_buffers = [storage("velocities 0"), storage("velocities 1")];

        let staging = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: buffer_size,
                usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        };
        let staging_positions = staging("position readback");
        let staging_velocities = staging("velocity readback");

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("sim uniforms"),
            size: std::mem::size_of::<SimUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("nbody bind layout"),
            entries: &[
                uniform_entry(0),
                storage_entry(1, true),
                storage_entry(2, true),
                storage_entry(3, false),
                storage_entry(4, false),
            ],
        });

        // Two bind groups, one per parity: the front pair reads, the back
        // pair writes, and a flip exchanges the roles.
        let bind_groups = [0_usize, 1].map(|parity| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("nbody bindings"),
                layout: &layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: uniform_buffer.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: position_buffers[parity].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: velocity_buffers[parity].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: position_buffers[1 - parity].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: velocity_buffers[1 - parity].as_entire_binding(),
                    },
                ],
            })
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("nbody pipeline layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("nbody pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        Ok(GpuBackend {
            device,
            queue,
            pipeline,
            bind_groups,
            position_buffers,
            velocity_buffers,
            uniform_buffer,
            staging_positions,
            staging_velocities,
            frame: 0,
            last_uniforms: None,
            host_positions: vec![0.0; 4 * body_count],
            host_velocities: vec![0.0; 4 * body_count],
            device_name: info.name,
            body_count,
        })
    }

    fn read_index(&self) -> usize {
        self.frame % 2
    }

    fn write_index(&self) -> usize {
        1 - self.read_index()
    }

    /// Copies a device buffer into its staging buffer and blocks until the
    /// mapped contents have landed in `dst`.
    fn read_back(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        source: &wgpu::Buffer,
        staging: &wgpu::Buffer,
        dst: &mut [f32],
    ) -> Result<(), SimError> {
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("readback"),
        });
        encoder.copy_buffer_to_buffer(source, 0, staging, 0, staging.size());
        queue.submit(Some(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);

        rx.recv()
            .map_err(|_| SimError::DeviceLost)?
            .map_err(|_| SimError::DeviceLost)?;

        {
            let mapped = slice.get_mapped_range();
            dst.copy_from_slice(bytemuck::cast_slice(&mapped));
        }
        staging.unmap();
        Ok(())
    }
}

impl ComputeBackend for GpuBackend {
    fn device_name(&self) -> &str {
        &self.device_name
    }

    fn device_count(&self) -> u32 {
        1
    }

    fn load(&mut self, positions: &[f32], velocities: &[f32]) -> Result<(), SimError> {
        if positions.len() != 4 * self.body_count || velocities.len() != 4 * self.body_count {
            return Err(SimError::Size(format!(
                "expected {} elements, got {}/{}",
                4 * self.body_count,
                positions.len(),
                velocities.len()
            )));
        }

        let read = self.read_index();
        self.queue.write_buffer(
            &self.position_buffers[read],
            0,
            bytemuck::cast_slice(positions),
        );
        self.queue.write_buffer(
            &self.velocity_buffers[read],
            0,
            bytemuck::cast_slice(velocities),
        );
        self.host_positions.copy_from_slice(positions);
        self.host_velocities.copy_from_slice(velocities);
        Ok(())
    }

    fn advance(&mut self, params: &SimParams, range: (usize, usize)) -> Result<(), SimError> {
        let uniforms = SimUniforms {
            time_step: params.time_step,
            softening_sq: params.softening_sq(),
            damping: params.damping,
            body_count: self.body_count as u32,
            range_min: range.0 as u32,
            range_max: range.1 as u32,
            _pad0: 0,
            _pad1: 0,
        };
        if self.last_uniforms != Some(uniforms) {
            self.queue
                .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
            self.last_uniforms = Some(uniforms);
        }

        let workgroups = (self.body_count / bodies::WORKGROUP_SIZE) as u32;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("nbody step"),
            });
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("nbody pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_groups[self.read_index()], &[]);
            pass.dispatch_workgroups(workgroups, 1, 1);
        }
        self.queue.submit(Some(encoder.finish()));

        // Readback of the freshly written pair into the host shadow.
        let write = self.write_index();
        Self::read_back(
            &self.device,
            &self.queue,
            &self.position_buffers[write],
            &self.staging_positions,
            &mut self.host_positions,
        )?;
        Self::read_back(
            &self.device,
            &self.queue,
            &self.velocity_buffers[write],
            &self.staging_velocities,
            &mut self.host_velocities,
        )?;

        // Role swap: the written pair becomes the front.
        self.frame += 1;
        Ok(())
    }

    fn positions(&self) -> &[f32] {
        &self.host_positions
    }

    fn velocities(&self) -> &[f32] {
        &self.host_velocities
    }

    fn refresh(&mut self) -> Result<(), SimError> {
        let read = self.read_index();
        Self::read_back(
            &self.device,
            &self.queue,
            &self.position_buffers[read],
            &self.staging_positions,
            &mut self.host_positions,
        )?;
        Self::read_back(
            &self.device,
            &self.queue,
            &self.velocity_buffers[read],
            &self.staging_velocities,
            &mut self.host_velocities,
        )
    }
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
