//! Determinism tests for the kernel generator.
//!
//! Identical parameters must give byte-identical programs. The parallel
//! candidate search must not leak thread scheduling into the result.

#[cfg(test)]
mod tests {
    use crate::codegen::{build_kernel, BuildOptions, KernelParams};
    use crate::core::{Engine, MachineConfig};
    use crate::vm::{check_program, Machine, Workload};

    /// Build the same kernel several times and compare the JSON renderings.
    fn verify_determinism(params: KernelParams, config: &MachineConfig, options: BuildOptions, runs: usize) {
        let first = build_kernel(&params, config, &options).expect("build failed");
        let first_json = first.program.to_json();

        for i in 1..runs {
            let again = build_kernel(&params, config, &options).expect("build failed");
            assert_eq!(again.parallelism, first.parallelism, "parallelism differs on run {}", i);
            assert!(again.program.to_json() == first_json, "program differs between run 0 and run {}", i);
        }
    }

    #[test]
    fn test_reference_build_deterministic() {
        verify_determinism(KernelParams::reference(), &MachineConfig::default(), BuildOptions::default(), 3);
    }

    #[test]
    fn test_fixed_build_deterministic() {
        verify_determinism(KernelParams::new(5, 96, 7), &MachineConfig::default(), BuildOptions::fixed(3), 5);
    }

    #[test]
    fn test_general_build_deterministic() {
        verify_determinism(KernelParams::new(4, 40, 6), &MachineConfig::default(), BuildOptions::general(), 5);
    }

    #[test]
    fn test_traced_build_deterministic() {
        verify_determinism(KernelParams::new(3, 16, 4), &MachineConfig::default(), BuildOptions::traced(), 5);
    }

    #[test]
    fn test_latency_build_deterministic() {
        let config = MachineConfig::default()
            .with_latency(Engine::Load, 3)
            .with_latency(Engine::Valu, 2);
        verify_determinism(KernelParams::new(5, 64, 8), &config, BuildOptions::default(), 5);
    }

    #[test]
    fn test_simulation_deterministic() {
        let config = MachineConfig::default();
        let params = KernelParams::new(4, 32, 5);
        let kernel = build_kernel(&params, &config, &BuildOptions::default()).unwrap();
        let workload = Workload::random(&params, 11);

        let mut images = Vec::new();
        for _ in 0..3 {
            let mut machine = Machine::new(&config, workload.image());
            machine.run(&kernel.program).unwrap();
            images.push(machine.into_memory());
        }
        assert!(images.windows(2).all(|w| w[0] == w[1]));
        assert!(check_program(&kernel.program, &config, &workload, false).is_ok());
    }

    #[test]
    fn test_workload_generation_deterministic() {
        let params = KernelParams::new(6, 128, 4);
        let a = Workload::random(&params, 42);
        let b = Workload::random(&params, 42);
        assert_eq!(a.image(), b.image());
    }
}
