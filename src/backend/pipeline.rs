// Graphics pipeline description for the triangle
//
// The description is assembled exactly as a pipeline-create call would take
// it, but no render pass, layout or pipeline object is created. Shader
// modules only live for the duration of the build.

use ash::vk;
use std::ffi::CStr;

use super::error::InitResult;
use super::shader::{spirv_words, ShaderModule, ShaderSource};
use super::LogicalDevice;

pub const ENTRY_POINT: &CStr = c"main";

/// Fixed-function state, owned so it can outlive the build call
#[derive(Debug, Clone, Copy)]
pub struct FixedFunctionState {
    pub dynamic_states: [vk::DynamicState; 2],
    pub topology: vk::PrimitiveTopology,
    pub primitive_restart: bool,
    pub viewport_count: u32,
    pub scissor_count: u32,
    pub rasterization: vk::PipelineRasterizationStateCreateInfo,
    pub multisample: vk::PipelineMultisampleStateCreateInfo,
    pub color_blend_attachment: vk::PipelineColorBlendAttachmentState,
}

impl FixedFunctionState {
    /// Filled, back-face culled, clockwise triangles straight to one color target
    pub fn triangle() -> Self {
        // Viewport and scissor are set per frame rather than baked in
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];

        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false)
            .build();

        // Multisampling (disabled)
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1)
            .min_sample_shading(1.0)
            .alpha_to_coverage_enable(false)
            .alpha_to_one_enable(false)
            .build();

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .src_color_blend_factor(vk::BlendFactor::ONE)
            .dst_color_blend_factor(vk::BlendFactor::ZERO)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .build();

        Self {
            dynamic_states,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            primitive_restart: false,
            viewport_count: 1,
            scissor_count: 1,
            rasterization,
            multisample,
            color_blend_attachment,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub entry_point: &'static CStr,
    pub word_count: usize,
}

/// What the assembled description contained
#[derive(Debug, Clone)]
pub struct PipelineTemplate {
    pub stages: Vec<ShaderStage>,
    pub state: FixedFunctionState,
}

/// Load both shaders and assemble the triangle pipeline description.
///
/// The shader modules are destroyed before this returns.
pub fn build_pipeline_template(
    device: &LogicalDevice,
    shaders: &dyn ShaderSource,
    vertex_shader: &str,
    fragment_shader: &str,
) -> InitResult<PipelineTemplate> {
    let vert_code = spirv_words(vertex_shader, &shaders.bytecode(vertex_shader)?)?;
    let frag_code = spirv_words(fragment_shader, &shaders.bytecode(fragment_shader)?)?;

    let vert_module =
        ShaderModule::new(device.handle(), vk::ShaderStageFlags::VERTEX, 0, &vert_code)?;
    let frag_module =
        ShaderModule::new(device.handle(), vk::ShaderStageFlags::FRAGMENT, 1, &frag_code)?;

    let state = FixedFunctionState::triangle();

    let shader_stages = [stage_info(&vert_module), stage_info(&frag_module)];

    // Vertex data is hard-coded in the vertex shader
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(state.topology)
        .primitive_restart_enable(state.primitive_restart);

    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewport_count(state.viewport_count)
        .scissor_count(state.scissor_count);

    let dynamic_state =
        vk::PipelineDynamicStateCreateInfo::builder().dynamic_states(&state.dynamic_states);

    let color_blend_attachments = [state.color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .logic_op(vk::LogicOp::COPY)
        .attachments(&color_blend_attachments);

    // No layout or render pass: this description is never submitted
    let description = vk::GraphicsPipelineCreateInfo::builder()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&state.rasterization)
        .multisample_state(&state.multisample)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state);

    log::info!(
        "Assembled triangle pipeline description: {} shader stages, {} dynamic states",
        description.stage_count,
        dynamic_state.dynamic_state_count
    );

    let stages = vec![
        ShaderStage {
            stage: vert_module.stage,
            entry_point: ENTRY_POINT,
            word_count: vert_code.len(),
        },
        ShaderStage {
            stage: frag_module.stage,
            entry_point: ENTRY_POINT,
            word_count: frag_code.len(),
        },
    ];

    // Linked into the description; no longer needed
    drop(frag_module);
    drop(vert_module);

    Ok(PipelineTemplate { stages, state })
}

fn stage_info(module: &ShaderModule<'_>) -> vk::PipelineShaderStageCreateInfo {
    vk::PipelineShaderStageCreateInfo::builder()
        .stage(module.stage)
        .module(module.handle)
        .name(ENTRY_POINT)
        .build()
}
