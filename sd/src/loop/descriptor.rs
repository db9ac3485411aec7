//! Named loop descriptors
//!
//! Each loop focuses on ONE code smell with clean context:
//!
//! - LEAKY: memory leaks, unbounded caches, global mutables
//! - ZOMBIE: dead code, unused functions, stale imports
//! - RACER: race conditions, async/await issues
//! - GHOST: hallucinated imports, fake dependencies
//! - COPYCAT: code duplication, similar functions
//! - SLOPPY: AI slop patterns (placeholders, buzzwords)
//! - TANGLED: complexity, god classes, feature envy
//! - LEAKER: security vulnerabilities
//! - SWALLOWER: exception handling gaps
//! - DRIFTER: verbosity, over-engineering

use findingstore::Category;

/// Static configuration for one smell category
#[derive(Debug, Clone, Copy)]
pub struct LoopDescriptor {
    /// Internal name ("leaky", "zombie", ...)
    pub name: &'static str,

    /// Display name for status output
    pub display_name: &'static str,

    /// Task label passed to the LLM router
    pub task: &'static str,

    /// Category findings are coerced to when theirs is missing or invalid
    pub primary_category: Category,

    /// Categories this loop accepts; always contains the primary
    pub allowed_categories: &'static [Category],

    /// Human description
    pub description: &'static str,

    /// Pre-filter analyzers whose findings become prompt hints
    pub prefilter_tools: &'static [&'static str],

    /// Iteration cap for one pass
    pub max_iterations: u32,

    /// Focus prompt for this smell
    pub prompt: &'static str,
}

/// Execution order: high-impact loops first
pub const PRIORITY_ORDER: [&str; 10] = [
    // Critical - security & correctness
    "leaker",
    "ghost",
    "racer",
    // High - code quality
    "leaky",
    "swallower",
    "zombie",
    // Medium - maintainability
    "tangled",
    "copycat",
    "sloppy",
    // Low - style
    "drifter",
];

/// All loop descriptors, keyed by internal name
pub fn descriptors() -> &'static [LoopDescriptor] {
    &DESCRIPTORS
}

/// Look up a descriptor by internal name
pub fn descriptor(name: &str) -> Option<&'static LoopDescriptor> {
    DESCRIPTORS.iter().find(|d| d.name == name)
}

static DESCRIPTORS: [LoopDescriptor; 10] = [
    LoopDescriptor {
        name: "leaky",
        display_name: "LEAKY",
        task: "memory_leaks",
        primary_category: Category::MemoryLeaks,
        allowed_categories: &[Category::MemoryLeaks],
        description: "Memory leaks, unbounded caches, global mutables",
        prefilter_tools: &["radon"],
        max_iterations: 5,
        prompt: LEAKY_PROMPT,
    },
    LoopDescriptor {
        name: "zombie",
        display_name: "ZOMBIE",
        task: "dead_code",
        primary_category: Category::DeadCode,
        allowed_categories: &[
            Category::DeadCode,
            Category::UnusedImports,
            Category::UnusedVariables,
            Category::UnreachableCode,
        ],
        description: "Dead code, unused functions, stale imports",
        prefilter_tools: &["vulture"],
        max_iterations: 3,
        prompt: ZOMBIE_PROMPT,
    },
    LoopDescriptor {
        name: "racer",
        display_name: "RACER",
        task: "race_conditions",
        primary_category: Category::RaceConditions,
        allowed_categories: &[Category::RaceConditions],
        description: "Race conditions, async/await issues, concurrency bugs",
        prefilter_tools: &[],
        max_iterations: 5,
        prompt: RACER_PROMPT,
    },
    LoopDescriptor {
        name: "ghost",
        display_name: "GHOST",
        task: "hallucinated_imports",
        primary_category: Category::HallucinatedImports,
        allowed_categories: &[Category::HallucinatedImports, Category::UnusedImports],
        description: "Hallucinated imports, fake dependencies",
        prefilter_tools: &["slop-detector"],
        max_iterations: 2,
        prompt: GHOST_PROMPT,
    },
    LoopDescriptor {
        name: "copycat",
        display_name: "COPYCAT",
        task: "code_duplication",
        primary_category: Category::CodeDuplication,
        allowed_categories: &[Category::CodeDuplication],
        description: "Code duplication, similar functions",
        prefilter_tools: &["jscpd"],
        max_iterations: 2,
        prompt: COPYCAT_PROMPT,
    },
    LoopDescriptor {
        name: "sloppy",
        display_name: "SLOPPY",
        task: "ai_slop",
        primary_category: Category::AiSlop,
        allowed_categories: &[Category::AiSlop, Category::PlaceholderCode, Category::DocstringInflation],
        description: "AI slop patterns (placeholders, buzzwords, fake docs)",
        prefilter_tools: &["slop-detector"],
        max_iterations: 3,
        prompt: SLOPPY_PROMPT,
    },
    LoopDescriptor {
        name: "tangled",
        display_name: "TANGLED",
        task: "complexity",
        primary_category: Category::Complexity,
        allowed_categories: &[Category::Complexity],
        description: "Complexity, god classes, feature envy",
        prefilter_tools: &["radon"],
        max_iterations: 4,
        prompt: TANGLED_PROMPT,
    },
    LoopDescriptor {
        name: "leaker",
        display_name: "LEAKER",
        task: "security",
        primary_category: Category::Security,
        allowed_categories: &[Category::Security],
        description: "Security vulnerabilities",
        prefilter_tools: &["bandit"],
        max_iterations: 3,
        prompt: LEAKER_PROMPT,
    },
    LoopDescriptor {
        name: "swallower",
        display_name: "SWALLOWER",
        task: "exception_handling",
        primary_category: Category::ExceptionHandling,
        allowed_categories: &[Category::ExceptionHandling, Category::BareExcept, Category::EmptyExcept],
        description: "Exception handling gaps",
        prefilter_tools: &["ruff"],
        max_iterations: 3,
        prompt: SWALLOWER_PROMPT,
    },
    LoopDescriptor {
        name: "drifter",
        display_name: "DRIFTER",
        task: "verbosity",
        primary_category: Category::Verbosity,
        allowed_categories: &[Category::Verbosity, Category::StyleIssues],
        description: "Verbosity, over-engineering",
        prefilter_tools: &[],
        max_iterations: 3,
        prompt: DRIFTER_PROMPT,
    },
];

const LEAKY_PROMPT: &str = "Find MEMORY LEAKS in this codebase:

Look for:
1. Unbounded caches that grow forever (dicts/lists without size limits)
2. Global mutable state that accumulates data
3. Missing cleanup in __del__ or context managers
4. Circular references preventing garbage collection
5. Event handlers that are never unregistered
6. File handles or connections that are never closed
7. Large objects held in closures unnecessarily

Focus ONLY on memory issues. Ignore other code smells.";

const ZOMBIE_PROMPT: &str = "Find DEAD CODE in this codebase:

Look for:
1. Functions that are never called -> category: dead_code
2. Classes that are never instantiated -> category: dead_code
3. Imports that are never used -> category: unused_imports
4. Variables that are assigned but never read -> category: unused_variables
5. Unreachable code after return/raise/break -> category: unreachable_code
6. Commented-out code blocks -> category: dead_code
7. Deprecated functions marked for removal -> category: dead_code

Use the vulture hints provided. Focus ONLY on dead code.";

const RACER_PROMPT: &str = "Find RACE CONDITIONS and CONCURRENCY BUGS in this codebase:

Look for:
1. Shared mutable state accessed from multiple async tasks
2. Missing locks/semaphores around critical sections
3. async/await without proper synchronization
4. Time-of-check to time-of-use (TOCTOU) bugs
5. Non-atomic read-modify-write operations
6. Deadlock potential from lock ordering
7. Missing thread safety in singleton patterns

Focus ONLY on concurrency issues. This requires careful analysis.";

const GHOST_PROMPT: &str = "Find HALLUCINATED IMPORTS in this codebase:

Look for:
1. Imports of packages that don't exist in PyPI/npm -> category: hallucinated_imports
2. Imports from wrong package names (e.g., 'from react import useRouter') -> category: hallucinated_imports
3. Purpose-specific imports that are never used (ML, HTTP, DB libraries) -> category: unused_imports
4. Imports of internal modules that don't exist -> category: hallucinated_imports
5. Version-specific imports that reference non-existent APIs -> category: hallucinated_imports

Focus ONLY on import issues. Check if packages actually exist.";

const COPYCAT_PROMPT: &str = "Find CODE DUPLICATION in this codebase:

Look for:
1. Copy-pasted code blocks (exact duplicates)
2. Similar functions with minor variations
3. Repeated patterns that could be abstracted
4. Duplicate logic across different modules
5. Similar error handling that could be centralized

Use the jscpd hints provided. Focus ONLY on duplication.";

const SLOPPY_PROMPT: &str = "Find AI SLOP PATTERNS in this codebase:

Look for:
1. Empty functions with only 'pass' or '...' -> category: placeholder_code
2. NotImplementedError without actual implementation -> category: placeholder_code
3. Buzzword claims without evidence (\"production-ready\", \"enterprise-grade\") -> category: ai_slop
4. Docstring inflation (more docs than code) -> category: docstring_inflation
5. Vibe coding comments (\"might work\", \"should be fine\") -> category: ai_slop
6. Generic boilerplate that doesn't fit the domain -> category: ai_slop
7. TODO/FIXME comments that were never addressed -> category: placeholder_code

Focus ONLY on AI-generated slop patterns.";

const TANGLED_PROMPT: &str = "Find COMPLEXITY ISSUES in this codebase:

Look for:
1. God classes with too many responsibilities
2. Feature envy (methods that use other classes more than their own)
3. Long methods (> 50 lines)
4. Deep nesting (> 4 levels)
5. High cyclomatic complexity (use radon hints)
6. Primitive obsession (using primitives instead of objects)
7. Data clumps (groups of data that appear together)

Focus ONLY on complexity and design issues.";

const LEAKER_PROMPT: &str = "Find SECURITY VULNERABILITIES in this codebase:

Look for:
1. Hardcoded secrets, passwords, API keys
2. SQL injection vulnerabilities
3. Command injection (shell=True, eval, exec)
4. Path traversal vulnerabilities
5. Insecure deserialization (pickle, yaml.load)
6. Missing input validation
7. Sensitive data in logs

Use the bandit hints provided. Focus ONLY on security issues.";

const SWALLOWER_PROMPT: &str = "Find EXCEPTION HANDLING ISSUES in this codebase:

Look for:
1. Bare except clauses (except:) -> category: bare_except
2. Empty except blocks (except: pass) -> category: empty_except
3. Catching too broad exceptions (except Exception) -> category: exception_handling
4. Missing error handling for I/O operations -> category: exception_handling
5. Swallowed exceptions that should be logged -> category: empty_except
6. Missing finally blocks for cleanup -> category: exception_handling
7. Re-raising without preserving stack trace -> category: exception_handling

Focus ONLY on exception handling issues.";

const DRIFTER_PROMPT: &str = "Find VERBOSITY and OVER-ENGINEERING in this codebase:

Look for:
1. Unnecessary abstraction layers -> category: verbosity
2. Over-complicated solutions for simple problems -> category: verbosity
3. Excessive defensive programming -> category: verbosity
4. Redundant validation that's already done elsewhere -> category: verbosity
5. Verbose code that could be simplified -> category: style_issues
6. Design patterns used inappropriately -> category: verbosity
7. Configuration for things that never change -> category: verbosity

Focus ONLY on verbosity and over-engineering.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_ten_loops_present() {
        assert_eq!(descriptors().len(), 10);
        for name in PRIORITY_ORDER {
            assert!(descriptor(name).is_some(), "missing loop '{name}'");
        }
    }

    #[test]
    fn test_priority_order_exact() {
        assert_eq!(
            PRIORITY_ORDER,
            ["leaker", "ghost", "racer", "leaky", "swallower", "zombie", "tangled", "copycat", "sloppy", "drifter"]
        );
    }

    #[test]
    fn test_allowed_always_contains_primary() {
        for desc in descriptors() {
            assert!(
                desc.allowed_categories.contains(&desc.primary_category),
                "loop '{}' excludes its own primary category",
                desc.name
            );
        }
    }

    #[test]
    fn test_iteration_caps() {
        let caps: Vec<(&str, u32)> = descriptors().iter().map(|d| (d.name, d.max_iterations)).collect();
        assert!(caps.contains(&("leaky", 5)));
        assert!(caps.contains(&("zombie", 3)));
        assert!(caps.contains(&("ghost", 2)));
        assert!(caps.contains(&("copycat", 2)));
        assert!(caps.contains(&("tangled", 4)));
    }

    #[test]
    fn test_prefilter_tools() {
        assert_eq!(descriptor("leaker").unwrap().prefilter_tools, ["bandit"]);
        assert_eq!(descriptor("zombie").unwrap().prefilter_tools, ["vulture"]);
        assert!(descriptor("racer").unwrap().prefilter_tools.is_empty());
        assert!(descriptor("drifter").unwrap().prefilter_tools.is_empty());
    }

    #[test]
    fn test_unknown_loop() {
        assert!(descriptor("phantom").is_none());
    }
}
