use std::path::PathBuf;

fn main() {
    // Rebuild if wrapper files change
    println!("cargo:rerun-if-changed=include/wrapper.h");
    println!("cargo:rerun-if-changed=src/wrapper.c");

    // Find DPDK through pkgconf; include paths feed both cc and bindgen.
    let pkg = pkgconf::PkgConfigParser::new()
        .probe(["libdpdk"], None)
        .unwrap();

    let include_paths: Vec<PathBuf> = pkg
        .cflags
        .iter()
        .filter_map(|flag| {
            if let pkgconf::CompilerFlag::IncludePath(path) = flag {
                Some(path.clone())
            } else {
                None
            }
        })
        .collect();

    // Use pkgconf to emit cargo link metadata.
    pkgconf::emit_cargo_metadata(&pkg.libs, true);

    compile_wrapper(&include_paths);
    generate_bindings(&include_paths);
}

fn compile_wrapper(include_dirs: &[PathBuf]) {
    let mut cc_builder = cc::Build::new();
    cc_builder.file("src/wrapper.c");
    cc_builder.include("include"); // For wrapper.h
    for path in include_dirs {
        cc_builder.include(path);
    }
    // Use corei7/Nehalem for QEMU software emulation compatibility
    // This matches DPDK's cpu_instruction_set=generic setting
    cc_builder.flag("-march=corei7");
    cc_builder.compile("dpdk_inline_wrapper");
}

/// Exported (linkable) DPDK functions, grouped by the cargo feature that
/// pulls them in. The `rust_*` forwarders are always bound.
const AREA_FUNCTIONS: &[(&str, &[&str])] = &[
    ("EAL", &["rte_eal_init", "rte_eal_cleanup", "rte_strerror"]),
    (
        "MEMPOOL",
        &[
            "rte_pktmbuf_pool_create",
            "rte_mempool_free",
            "rte_mempool_lookup",
            "rte_mempool_avail_count",
            "rte_mempool_in_use_count",
        ],
    ),
    (
        "ETHDEV",
        &[
            "rte_eth_dev_info_get",
            "rte_eth_dev_count_avail",
            "rte_eth_macaddr_get",
            "rte_eth_stats_get",
            "rte_eth_dev_socket_id",
            "rte_eth_dev_configure",
            "rte_eth_dev_start",
            "rte_eth_dev_stop",
            "rte_eth_dev_close",
            "rte_eth_rx_queue_setup",
            "rte_eth_tx_queue_setup",
        ],
    ),
    ("CYCLES", &["rte_get_tsc_hz", "rte_delay_us_block"]),
    (
        "CPUSET",
        &["rte_thread_set_affinity", "rte_thread_get_affinity"],
    ),
    (
        "LCORE",
        &[
            "rte_eal_mp_wait_lcore",
            "rte_eal_wait_lcore",
            "rte_eal_get_lcore_state",
            "rte_eal_lcore_role",
            "rte_lcore_count",
            "rte_lcore_is_enabled",
            "rte_lcore_to_socket_id",
            "rte_lcore_to_cpu_id",
            "rte_lcore_cpuset",
            "rte_get_next_lcore",
        ],
    ),
];

fn feature_enabled(area: &str) -> bool {
    std::env::var_os(format!("CARGO_FEATURE_{area}")).is_some()
}

fn generate_bindings(include_dirs: &[PathBuf]) {
    let outdir = PathBuf::from(std::env::var("OUT_DIR").unwrap());

    let mut bgbuilder = bindgen::builder().clang_arg("-march=corei7");
    for path in include_dirs {
        bgbuilder = bgbuilder.clang_arg(format!("-I{}", path.display()));
    }

    // every forwarder defined in src/wrapper.c
    bgbuilder = bgbuilder.allowlist_function("rust_.*");
    for (area, functions) in AREA_FUNCTIONS {
        if !feature_enabled(area) {
            continue;
        }
        for f in *functions {
            bgbuilder = bgbuilder.allowlist_function(f);
        }
    }

    let bgbuilder = bgbuilder
        // types
        .allowlist_type("rte_eth_conf")
        .allowlist_type("rte_eth_dev_info")
        .allowlist_type("rte_eth_rxconf")
        .allowlist_type("rte_eth_txconf")
        .allowlist_type("rte_ether_addr")
        .allowlist_type("rte_eth_stats")
        .allowlist_type("rte_mempool")
        .allowlist_type("rte_mbuf")
        .allowlist_type("rte_spinlock_t")
        .allowlist_type("rte_spinlock_recursive_t")
        .allowlist_type("rte_cpuset_t")
        .allowlist_type("cpu_set_t")
        .allowlist_type("rte_lcore_state_t")
        .allowlist_type("rte_lcore_role_t")
        // build-config constants
        .allowlist_var("RTE_MAX_LCORE")
        .allowlist_var("RTE_MAX_NUMA_NODES")
        .allowlist_var("RTE_MBUF_DEFAULT_DATAROOM")
        .allowlist_var("RTE_PKTMBUF_HEADROOM")
        .allowlist_var("SOCKET_ID_ANY")
        .derive_default(true)
        .layout_tests(false)
        .header("include/wrapper.h");

    let bindings = bgbuilder
        .generate()
        .expect("Unable to generate DPDK bindings");

    bindings
        .write_to_file(outdir.join("dpdk_bindings.rs"))
        .expect("Couldn't write bindings!");
}
